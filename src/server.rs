use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::{watch, RwLock};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::models::IssueState;
use crate::platform::github::GitHubPlatform;
use crate::platform::Platform;
use crate::queue::task::{IssueKey, TriageTask};
use crate::queue::TaskQueue;
use crate::workflow::WorkflowOrchestrator;

pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: WorkflowOrchestrator,
    /// Present when a `[github]` section is configured.
    pub platform: Option<Arc<dyn Platform>>,
    pub task_queue: RwLock<TaskQueue>,
    /// Cancellation handles for runs currently executing. An issue can have
    /// more than one run while a cancelled run is still unwinding.
    in_flight: RwLock<HashMap<IssueKey, Vec<InFlightRun>>>,
    next_run_id: AtomicU64,
}

struct InFlightRun {
    id: u64,
    cancel: watch::Sender<bool>,
}

impl InFlightRun {
    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

impl AppState {
    pub fn new(
        config: AppConfig,
        orchestrator: WorkflowOrchestrator,
        platform: Option<Arc<dyn Platform>>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            platform,
            task_queue: RwLock::new(TaskQueue::new()),
            in_flight: RwLock::new(HashMap::new()),
            next_run_id: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: AppConfig, index: Arc<dyn VectorIndex>) -> Result<Self> {
        let orchestrator = WorkflowOrchestrator::from_config(&config, index)?;
        let platform = match config.github.as_ref() {
            Some(github) => Some(Arc::new(GitHubPlatform::new(github)?) as Arc<dyn Platform>),
            None => None,
        };
        Ok(Self::new(config, orchestrator, platform))
    }

    /// Queue a triage unless the issue is already queued or has a run that
    /// has not been cancelled.
    pub async fn enqueue_triage(&self, task: TriageTask) -> bool {
        let mut queue = self.task_queue.write().await;
        let running = self
            .in_flight
            .read()
            .await
            .get(&task.key())
            .is_some_and(|runs| runs.iter().any(|run| !run.is_cancelled()));
        if running {
            tracing::debug!(task = %task.description(), "Triage already running");
            return false;
        }
        queue.enqueue(task)
    }

    /// Track a run so it can be cancelled. Returns the run id to hand back
    /// to [`AppState::finish_in_flight`] and the receiver the run must watch.
    pub async fn register_in_flight(&self, key: IssueKey) -> (u64, watch::Receiver<bool>) {
        let id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(false);
        self.in_flight
            .write()
            .await
            .entry(key)
            .or_default()
            .push(InFlightRun { id, cancel: tx });
        (id, rx)
    }

    /// Forget one run. Other runs for the same issue stay registered.
    pub async fn finish_in_flight(&self, key: &IssueKey, run_id: u64) {
        let mut in_flight = self.in_flight.write().await;
        if let Some(runs) = in_flight.get_mut(key) {
            runs.retain(|run| run.id != run_id);
            if runs.is_empty() {
                in_flight.remove(key);
            }
        }
    }

    /// Signal every in-flight run for an issue.
    pub async fn cancel_issue(&self, repo_full_name: &str, issue_number: u64) -> bool {
        let key = IssueKey {
            repo_full_name: repo_full_name.to_string(),
            issue_number,
        };
        match self.in_flight.read().await.get(&key) {
            Some(runs) if !runs.is_empty() => {
                tracing::info!(issue = %key, runs = runs.len(), "Cancelling in-flight triage");
                for run in runs {
                    let _ = run.cancel.send(true);
                }
                true
            }
            _ => false,
        }
    }

    pub async fn get_in_flight_issues(&self) -> Vec<IssueKey> {
        self.in_flight.read().await.keys().cloned().collect()
    }

    /// Signal every in-flight run, returning how many were signalled.
    pub async fn cancel_all_in_flight(&self) -> usize {
        let in_flight = self.in_flight.read().await;
        let mut signalled = 0;
        for run in in_flight.values().flatten() {
            let _ = run.cancel.send(true);
            signalled += 1;
        }
        signalled
    }
}

#[derive(Debug, Deserialize)]
pub struct TriageRequest {
    pub title: String,
    #[serde(default)]
    pub body: String,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/triage", post(triage_issue))
        .route("/webhooks/github", post(crate::webhook::handler::handle_webhook))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Triage one issue synchronously and return the final state.
async fn triage_issue(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TriageRequest>,
) -> Json<IssueState> {
    let result = state
        .orchestrator
        .process_issue(&request.title, &request.body)
        .await;
    Json(result)
}

async fn health_check() -> &'static str {
    "ok"
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{SafetyConfig, SearchConfig, StageTimeouts};
    use crate::index::MemoryIndex;
    use crate::safety::SafetyValidator;
    use crate::search::engine::tests::VocabEmbedder;
    use crate::search::SimilaritySearchEngine;
    use crate::workflow::classify::tests::ScriptedModel;
    use crate::workflow::{ClassificationStage, RecommendationStage};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    pub(crate) const WEBHOOK_SECRET: &str = "test-secret";

    pub(crate) fn test_config() -> AppConfig {
        config::Config::builder()
            .add_source(config::File::from_str(
                &format!(
                    "[claude]\napi_key = \"k\"\n\n[github]\ntoken = \"t\"\nwebhook_secret = \"{WEBHOOK_SECRET}\"\n"
                ),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    pub(crate) fn test_state() -> Arc<AppState> {
        let model = ScriptedModel::new(
            Ok(json!({
                "category": "bug",
                "priority": "medium",
                "labels": [],
                "assignee": "unassigned"
            })),
            Ok("Looks like a convergence problem in HuberRegressor.".to_string()),
        );
        let orchestrator = WorkflowOrchestrator::new(
            Arc::new(SafetyValidator::from_config(&SafetyConfig::default()).unwrap()),
            Arc::new(SimilaritySearchEngine::new(
                Arc::new(VocabEmbedder::new()),
                Arc::new(MemoryIndex::new()),
                &SearchConfig::default(),
            )),
            ClassificationStage::new(model.clone()),
            RecommendationStage::new(model, 4),
            5,
            StageTimeouts::default(),
        );
        Arc::new(AppState::new(test_config(), orchestrator, None))
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health() {
        let response = create_router(test_state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn test_triage_endpoint_returns_final_state() {
        let (status, body) = post_json(
            create_router(test_state()),
            "/triage",
            json!({
                "title": "Bug in HuberRegressor",
                "body": "I encountered unexpected behavior in the model when fitting certain data."
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["blocked"], false);
        assert_eq!(body["classification"]["category"], "bug");
        assert!(body["recommendation"]["summary"].as_str().unwrap().contains("HuberRegressor"));
    }

    #[tokio::test]
    async fn test_triage_endpoint_reports_block() {
        let (status, body) = post_json(
            create_router(test_state()),
            "/triage",
            json!({ "title": "Deploy fails", "body": "API_KEY=sk-abc123xyz789" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "blocked");
        assert_eq!(body["blocked"], true);
        assert_eq!(body["validation_summary"]["type"], "SecretsPresent_Input");
    }

    fn key(issue_number: u64) -> IssueKey {
        IssueKey {
            repo_full_name: "o/r".to_string(),
            issue_number,
        }
    }

    fn task(issue_number: u64) -> TriageTask {
        TriageTask {
            repo_full_name: "o/r".to_string(),
            issue_number,
            title: "Bug in HuberRegressor".to_string(),
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn test_in_flight_cancellation() {
        let state = test_state();
        let (run_id, rx) = state.register_in_flight(key(7)).await;

        assert!(state.cancel_issue("o/r", 7).await);
        assert!(*rx.borrow());
        assert!(!state.cancel_issue("o/r", 8).await);

        state.finish_in_flight(&key(7), run_id).await;
        assert!(state.get_in_flight_issues().await.is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_runs_stay_cancellable() {
        let state = test_state();

        // Closed, then reopened while the first run is still unwinding.
        let (first_id, first_rx) = state.register_in_flight(key(1)).await;
        assert!(state.cancel_issue("o/r", 1).await);
        let (second_id, second_rx) = state.register_in_flight(key(1)).await;
        assert_ne!(first_id, second_id);

        // The first run finishing must not drop the second run's handle.
        state.finish_in_flight(&key(1), first_id).await;
        assert!(*first_rx.borrow());
        assert!(!*second_rx.borrow());

        assert!(state.cancel_issue("o/r", 1).await);
        assert!(*second_rx.borrow());

        state.finish_in_flight(&key(1), second_id).await;
        assert!(state.get_in_flight_issues().await.is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_skips_issue_with_live_run() {
        let state = test_state();
        let (_run_id, _rx) = state.register_in_flight(key(3)).await;

        assert!(!state.enqueue_triage(task(3)).await);
        assert!(state.task_queue.read().await.is_empty());

        // Once the live run is cancelled a reopen is accepted again.
        state.cancel_issue("o/r", 3).await;
        assert!(state.enqueue_triage(task(3)).await);
        assert!(!state.enqueue_triage(task(3)).await);
        assert_eq!(state.task_queue.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_all_counts_every_run() {
        let state = test_state();
        let (_a, rx_a) = state.register_in_flight(key(1)).await;
        let (_b, rx_b) = state.register_in_flight(key(1)).await;
        let (_c, rx_c) = state.register_in_flight(key(2)).await;

        assert_eq!(state.cancel_all_in_flight().await, 3);
        assert!(*rx_a.borrow() && *rx_b.borrow() && *rx_c.borrow());
    }
}
