use crate::models::ValidationType;

/// Position of a run in the triage state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    InputSafety,
    Search,
    Classify,
    Recommend,
    OutputSafety,
    Done,
    /// Terminal; reachable from either safety stage.
    Blocked,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Blocked)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::InputSafety => "input_safety",
            Stage::Search => "search",
            Stage::Classify => "classify",
            Stage::Recommend => "recommend",
            Stage::OutputSafety => "output_safety",
            Stage::Done => "done",
            Stage::Blocked => "blocked",
        };
        f.write_str(name)
    }
}

/// What a queued triage task did with its result.
#[derive(Debug)]
pub enum TriageOutcome {
    /// Recommendation posted as a comment on the issue.
    Published { labels_applied: usize },
    /// Finished, but nothing was posted (publishing disabled or nothing to say).
    NotPublished,
    /// A safety check stopped the run; nothing was posted.
    Blocked { validation_type: ValidationType },
    /// The issue was closed or the service shut down mid-run.
    Cancelled,
}
