use crate::error::Result;
use crate::models::{IssueState, RunStatus};
use crate::queue::task::TriageTask;
use crate::server::AppState;
use crate::workflow::types::TriageOutcome;

/// Report a finished webhook triage back to the issue. Blocked and
/// cancelled runs post nothing.
pub async fn publish_triage(
    state: &AppState,
    task: &TriageTask,
    result: &IssueState,
) -> Result<TriageOutcome> {
    match result.status {
        RunStatus::Cancelled | RunStatus::Pending => return Ok(TriageOutcome::Cancelled),
        RunStatus::Blocked => {
            let validation_type = result
                .validation_summary
                .as_ref()
                .map(|s| s.validation_type);
            tracing::info!(
                task = %task.description(),
                validation_type = ?validation_type,
                "Triage blocked, nothing published"
            );
            return Ok(match validation_type {
                Some(validation_type) => TriageOutcome::Blocked { validation_type },
                None => TriageOutcome::NotPublished,
            });
        }
        RunStatus::Completed => {}
    }

    let (Some(platform), Some(github)) = (state.platform.as_ref(), state.config.github.as_ref()) else {
        return Ok(TriageOutcome::NotPublished);
    };
    if !github.publish_comments {
        return Ok(TriageOutcome::NotPublished);
    }
    let Some(comment) = render_comment(result) else {
        return Ok(TriageOutcome::NotPublished);
    };

    platform
        .post_comment(&task.repo_full_name, task.issue_number, &comment)
        .await?;

    let mut labels_applied = 0;
    if github.apply_labels {
        if let Some(classification) = result.classification.as_ref() {
            let labels: Vec<String> = classification.labels.iter().cloned().collect();
            // Labels are best-effort once the comment is up.
            match platform
                .add_labels(&task.repo_full_name, task.issue_number, &labels)
                .await
            {
                Ok(()) => labels_applied = labels.len(),
                Err(e) => tracing::warn!(
                    task = %task.description(),
                    error = %e,
                    "Failed to apply labels"
                ),
            }
        }
    }

    Ok(TriageOutcome::Published { labels_applied })
}

/// Markdown comment for a completed triage, or `None` without a recommendation.
pub fn render_comment(result: &IssueState) -> Option<String> {
    let recommendation = result.recommendation.as_ref()?;
    let mut comment = format!("### Automated triage\n\n{}\n", recommendation.summary);

    if let Some(classification) = result.classification.as_ref() {
        comment.push_str(&format!(
            "\n**Category:** {} | **Priority:** {}\n",
            classification.category, classification.priority
        ));
        if !classification.labels.is_empty() {
            let labels = classification
                .labels
                .iter()
                .map(|l| format!("`{l}`"))
                .collect::<Vec<_>>()
                .join(", ");
            comment.push_str(&format!("**Suggested labels:** {labels}\n"));
        }
        comment.push_str(&format!("**Suggested assignee:** {}\n", classification.assignee));
    }

    if !recommendation.references.is_empty() {
        comment.push_str("\n**Related issues:**\n");
        for url in &recommendation.references {
            comment.push_str(&format!("- {url}\n"));
        }
    }

    comment.push_str("\n---\n*Automated by issue-triage*");
    Some(comment)
}
