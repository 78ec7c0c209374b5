use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::hit::SimilarityHit;

/// One retrieved neighbour of the issue being triaged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarIssue {
    pub issue_number: Option<u64>,
    pub repo: Option<String>,
    pub owner: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub comment_id: Option<u64>,
    pub chunk_text: Option<String>,
    pub score: f32,
    pub is_bug: Option<bool>,
    pub is_feature: Option<bool>,
}

impl SimilarIssue {
    /// Map a hit's payload into the issue shape. Hits without a payload are dropped.
    pub fn from_hit(hit: &SimilarityHit) -> Option<Self> {
        hit.payload.as_ref()?;
        Some(Self {
            issue_number: hit.u64_field("issue_number"),
            repo: hit.str_field("repo"),
            owner: hit.str_field("owner"),
            title: hit.str_field("title"),
            url: hit.str_field("url"),
            comment_id: hit.u64_field("comment_id"),
            chunk_text: hit.str_field("chunk_text"),
            score: hit.score,
            is_bug: hit.bool_field("is_bug"),
            is_feature: hit.bool_field("is_feature"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub priority: String,
    pub labels: BTreeSet<String>,
    pub assignee: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub summary: String,
    /// Distinct reference URLs in first-seen order.
    pub references: Vec<String>,
}

/// Which screening produced a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationType {
    #[serde(rename = "DetectJailbreak")]
    DetectJailbreak,
    #[serde(rename = "ToxicLanguage_Input")]
    ToxicLanguageInput,
    #[serde(rename = "SecretsPresent_Input")]
    SecretsPresentInput,
    #[serde(rename = "ToxicLanguage_Output")]
    ToxicLanguageOutput,
    #[serde(rename = "SecretsPresent_Output")]
    SecretsPresentOutput,
    /// The input detector backend failed; the issue was blocked unscreened.
    #[serde(rename = "ValidatorError_Input")]
    ValidatorErrorInput,
    /// The output detector backend failed; the recommendation was withheld.
    #[serde(rename = "ValidatorError_Output")]
    ValidatorErrorOutput,
}

impl ValidationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DetectJailbreak => "DetectJailbreak",
            Self::ToxicLanguageInput => "ToxicLanguage_Input",
            Self::SecretsPresentInput => "SecretsPresent_Input",
            Self::ToxicLanguageOutput => "ToxicLanguage_Output",
            Self::SecretsPresentOutput => "SecretsPresent_Output",
            Self::ValidatorErrorInput => "ValidatorError_Input",
            Self::ValidatorErrorOutput => "ValidatorError_Output",
        }
    }
}

impl std::fmt::Display for ValidationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte range of offending text, relative to the screened string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSpan {
    pub start: usize,
    pub end: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    #[serde(rename = "type")]
    pub validation_type: ValidationType,
    pub failure_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_spans: Option<Vec<ErrorSpan>>,
}

/// Completion marker for a run. `Pending` means the run never finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Completed,
    Blocked,
    Cancelled,
}

/// The unit of work threaded through every workflow stage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IssueState {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub similar_issues: Vec<SimilarIssue>,
    #[serde(default)]
    pub classification: Option<Classification>,
    #[serde(default)]
    pub recommendation: Option<Recommendation>,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub validation_summary: Option<ValidationSummary>,
    /// Non-fatal stage failures. Append-only within a run.
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub status: RunStatus,
}

impl IssueState {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    /// Text screened and embedded for the incoming issue.
    pub fn query_text(&self) -> String {
        format!("{} {}", self.title, self.body)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, RunStatus::Completed | RunStatus::Blocked)
    }

    pub fn record_error(&mut self, message: String) {
        self.errors.push(message);
    }

    pub fn block(&mut self, summary: ValidationSummary) {
        self.blocked = true;
        self.validation_summary = Some(summary);
        self.status = RunStatus::Blocked;
    }

    /// Up to `max` distinct reference URLs, first-seen wins.
    pub fn reference_urls(&self, max: usize) -> Vec<String> {
        let mut references: Vec<String> = Vec::with_capacity(max);
        for url in self.similar_issues.iter().filter_map(|i| i.url.as_deref()) {
            if references.len() >= max {
                break;
            }
            if !references.iter().any(|seen| seen == url) {
                references.push(url.to_string());
            }
        }
        references
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn neighbour(url: Option<&str>) -> SimilarIssue {
        SimilarIssue {
            issue_number: Some(1),
            repo: None,
            owner: None,
            title: None,
            url: url.map(str::to_string),
            comment_id: None,
            chunk_text: None,
            score: 0.5,
            is_bug: None,
            is_feature: None,
        }
    }

    #[test]
    fn test_reference_urls_dedup_first_seen_and_cap() {
        let mut state = IssueState::new("t", "b");
        state.similar_issues = vec![
            neighbour(Some("https://x/1")),
            neighbour(Some("https://x/2")),
            neighbour(Some("https://x/1")),
            neighbour(None),
            neighbour(Some("https://x/3")),
            neighbour(Some("https://x/2")),
            neighbour(Some("https://x/4")),
            neighbour(Some("https://x/5")),
        ];

        assert_eq!(
            state.reference_urls(4),
            vec!["https://x/1", "https://x/2", "https://x/3", "https://x/4"]
        );
        assert_eq!(state.reference_urls(2), vec!["https://x/1", "https://x/2"]);
        assert!(state.reference_urls(0).is_empty());
    }

    #[test]
    fn test_from_hit_maps_payload_fields() {
        let payload = json!({
            "issue_number": 42,
            "repo": "scikit-learn",
            "owner": "scikit-learn",
            "title": "HuberRegressor fails",
            "url": "https://github.com/scikit-learn/scikit-learn/issues/42",
            "comment_id": 7,
            "chunk_text": "It diverges",
            "is_bug": true,
            "is_feature": false
        });
        let hit = SimilarityHit {
            id: "p1".to_string(),
            score: 0.75,
            payload: payload.as_object().cloned(),
        };

        let issue = SimilarIssue::from_hit(&hit).unwrap();
        assert_eq!(issue.issue_number, Some(42));
        assert_eq!(issue.comment_id, Some(7));
        assert_eq!(issue.is_bug, Some(true));
        assert_eq!(issue.title.as_deref(), Some("HuberRegressor fails"));
        assert_eq!(issue.score, 0.75);

        let bare = SimilarityHit { id: "p2".to_string(), score: 0.1, payload: None };
        assert!(SimilarIssue::from_hit(&bare).is_none());
    }

    #[test]
    fn test_validation_summary_serializes_type_name() {
        let summary = ValidationSummary {
            validation_type: ValidationType::SecretsPresentInput,
            failure_reason: "found".to_string(),
            score: None,
            error_spans: None,
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["type"], "SecretsPresent_Input");
        assert!(value.get("score").is_none());
    }

    #[test]
    fn test_block_marks_state_terminal() {
        let mut state = IssueState::new("t", "b");
        assert!(!state.is_complete());
        state.block(ValidationSummary {
            validation_type: ValidationType::DetectJailbreak,
            failure_reason: "r".to_string(),
            score: Some(1.0),
            error_spans: None,
        });
        assert!(state.blocked);
        assert_eq!(state.status, RunStatus::Blocked);
        assert!(state.is_complete());
    }
}
