use std::sync::Arc;

use tokio::signal;

use crate::server::AppState;

/// Wait for a shutdown signal (SIGINT or SIGTERM).
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }
}

/// Graceful shutdown: drop queued tasks and cancel in-flight triage runs.
/// Cancelled runs publish nothing.
pub async fn graceful_shutdown(state: &Arc<AppState>) {
    tracing::info!("Starting graceful shutdown...");

    let dropped = state.task_queue.write().await.clear();
    if dropped > 0 {
        tracing::info!(count = dropped, "Dropped queued triage tasks");
    }

    let in_flight_issues = state.get_in_flight_issues().await;
    if in_flight_issues.is_empty() {
        tracing::info!("No in-flight triage runs to cancel");
        return;
    }

    for issue in &in_flight_issues {
        tracing::info!(issue = %issue, "Cancelling in-flight triage");
    }
    let cancelled = state.cancel_all_in_flight().await;

    tracing::info!(count = cancelled, "Graceful shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::task::{IssueKey, TriageTask};
    use crate::server::tests::test_state;

    #[tokio::test]
    async fn test_graceful_shutdown_cancels_everything() {
        let state = test_state();
        state.task_queue.write().await.enqueue(TriageTask {
            repo_full_name: "o/r".to_string(),
            issue_number: 1,
            title: "t".to_string(),
            body: String::new(),
        });
        let (_run_id, rx) = state
            .register_in_flight(IssueKey {
                repo_full_name: "o/r".to_string(),
                issue_number: 2,
            })
            .await;

        graceful_shutdown(&state).await;

        assert!(state.task_queue.read().await.is_empty());
        assert!(*rx.borrow());
    }
}
