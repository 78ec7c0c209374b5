use octocrab::models::issues::{Comment, Issue};

use crate::platform::types::{CommentRecord, IssueRecord};

const BUG_LABELS: [&str; 3] = ["bug", "type: bug", "regression"];
const FEATURE_LABELS: [&str; 4] = ["feature", "enhancement", "new feature", "type: feature"];

/// Map an octocrab issue and its comments to an ingestable record.
pub fn map_issue(owner: &str, repo: &str, issue: &Issue, comments: Vec<Comment>) -> IssueRecord {
    let labels: Vec<String> = issue.labels.iter().map(|l| l.name.clone()).collect();

    IssueRecord {
        owner: owner.to_string(),
        repo: repo.to_string(),
        number: issue.number,
        title: issue.title.clone(),
        body: issue.body.clone().unwrap_or_default(),
        url: issue.html_url.to_string(),
        is_bug: has_label(&labels, &BUG_LABELS),
        is_feature: has_label(&labels, &FEATURE_LABELS),
        labels,
        comments: comments.into_iter().map(map_comment).collect(),
    }
}

fn map_comment(comment: Comment) -> CommentRecord {
    CommentRecord {
        id: comment.id.into_inner(),
        body: comment.body.unwrap_or_default(),
        created_at: Some(comment.created_at),
    }
}

/// Case-insensitive match of any label against a known set.
pub fn has_label(labels: &[String], known: &[&str]) -> bool {
    labels
        .iter()
        .any(|label| known.iter().any(|k| label.eq_ignore_ascii_case(k)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_matching_ignores_case() {
        let labels = vec!["Bug".to_string(), "module:linear_model".to_string()];
        assert!(has_label(&labels, &BUG_LABELS));
        assert!(!has_label(&labels, &FEATURE_LABELS));
        assert!(has_label(&["Enhancement".to_string()], &FEATURE_LABELS));
    }
}
