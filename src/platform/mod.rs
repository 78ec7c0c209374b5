pub mod github;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use types::IssueRecord;

/// Issue tracker the service reads history from and publishes triage to.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Post a comment on an issue.
    async fn post_comment(&self, repo_full_name: &str, issue_number: u64, body: &str) -> Result<()>;

    /// Add labels to an issue. Existing labels are kept.
    async fn add_labels(&self, repo_full_name: &str, issue_number: u64, labels: &[String]) -> Result<()>;

    /// Issues (not pull requests) of a repository with their comments,
    /// newest first, at most `limit` when given.
    async fn list_issues_with_comments(
        &self,
        repo_full_name: &str,
        limit: Option<usize>,
    ) -> Result<Vec<IssueRecord>>;
}
