use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A historical issue with its discussion, as ingested into the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub url: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub is_bug: bool,
    #[serde(default)]
    pub is_feature: bool,
    #[serde(default)]
    pub comments: Vec<CommentRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: u64,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl IssueRecord {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Comments in creation order; undated comments keep their position at the end.
    pub fn comments_by_creation(&self) -> Vec<&CommentRecord> {
        let mut comments: Vec<&CommentRecord> = self.comments.iter().collect();
        comments.sort_by_key(|c| (c.created_at.is_none(), c.created_at));
        comments
    }
}
