/// Identity of an issue across queue, in-flight registry and webhooks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IssueKey {
    pub repo_full_name: String,
    pub issue_number: u64,
}

impl std::fmt::Display for IssueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.repo_full_name, self.issue_number)
    }
}

/// A newly opened issue waiting to be triaged.
#[derive(Debug, Clone)]
pub struct TriageTask {
    pub repo_full_name: String,
    pub issue_number: u64,
    pub title: String,
    pub body: String,
}

impl TriageTask {
    pub fn key(&self) -> IssueKey {
        IssueKey {
            repo_full_name: self.repo_full_name.clone(),
            issue_number: self.issue_number,
        }
    }

    pub fn description(&self) -> String {
        format!("Triage issue #{} on {}", self.issue_number, self.repo_full_name)
    }
}
