use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::queue::task::TriageTask;
use crate::server::AppState;
use crate::webhook::events::{IssuesEvent, WebhookEvent};
use crate::webhook::signature::verify_signature;

pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    // Unsigned webhooks are never accepted.
    let Some(secret) = state.config.webhook_secret() else {
        tracing::warn!("Webhook received but no webhook secret is configured");
        return StatusCode::UNAUTHORIZED;
    };

    let signature = match headers.get("x-hub-signature-256").and_then(|v| v.to_str().ok()) {
        Some(sig) => sig.to_string(),
        None => {
            tracing::warn!("Missing X-Hub-Signature-256 header");
            return StatusCode::UNAUTHORIZED;
        }
    };

    let event_type = match headers.get("x-github-event").and_then(|v| v.to_str().ok()) {
        Some(et) => et.to_string(),
        None => {
            tracing::warn!("Missing X-GitHub-Event header");
            return StatusCode::BAD_REQUEST;
        }
    };

    if let Err(e) = verify_signature(secret, &body, &signature) {
        tracing::warn!(error = %e, "Webhook signature verification failed");
        return StatusCode::UNAUTHORIZED;
    }

    let event = match WebhookEvent::parse(&event_type, &body) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(error = %e, event_type = %event_type, "Failed to parse webhook event");
            return StatusCode::BAD_REQUEST;
        }
    };

    tracing::info!(event_type = %event_type, "Received webhook event");

    match event {
        WebhookEvent::Issues(issues_event) => handle_issues_event(&state, issues_event).await,
        WebhookEvent::Ping => {
            tracing::info!("Received ping event");
            StatusCode::OK
        }
        WebhookEvent::Unsupported(event_type) => {
            tracing::debug!(event_type = %event_type, "Ignoring unsupported event");
            StatusCode::OK
        }
    }
}

async fn handle_issues_event(state: &AppState, event: IssuesEvent) -> StatusCode {
    let repo = &event.repository.full_name;
    let number = event.issue.number;

    match event.action.as_str() {
        "closed" => {
            tracing::info!(repo = %repo, issue = number, "Issue closed, cancelling triage");
            let mut queue = state.task_queue.write().await;
            queue.cancel_issue(repo, number);
            state.cancel_issue(repo, number).await;
            StatusCode::OK
        }
        "opened" | "reopened" => {
            // Don't process pull requests via the issues event
            if event.issue.pull_request.is_some() {
                return StatusCode::OK;
            }

            tracing::info!(
                repo = %repo,
                issue = number,
                action = %event.action,
                "Issue opened, enqueuing triage"
            );

            let task = TriageTask {
                repo_full_name: repo.clone(),
                issue_number: number,
                title: event.issue.title,
                body: event.issue.body.unwrap_or_default(),
            };
            if state.enqueue_triage(task).await {
                StatusCode::ACCEPTED
            } else {
                StatusCode::OK
            }
        }
        _ => StatusCode::OK,
    }
}
