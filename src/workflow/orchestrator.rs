use std::sync::Arc;

use tokio::sync::watch;

use crate::config::{AppConfig, StageTimeouts};
use crate::embedding::{Embedder, HttpEmbedder};
use crate::error::{with_timeout, AppError, Result};
use crate::index::VectorIndex;
use crate::llm::{ClaudeClient, LanguageModel};
use crate::models::{IssueState, RunStatus, SimilarIssue, ValidationSummary, ValidationType};
use crate::safety::{Direction, SafetyValidator, Screen, Screening};
use crate::search::engine::SimilaritySearchEngine;
use crate::search::SimilaritySearch;
use crate::workflow::classify::ClassificationStage;
use crate::workflow::recommend::RecommendationStage;
use crate::workflow::types::Stage;

/// Sequences input safety, search, classification, recommendation and
/// output safety over one exclusively owned [`IssueState`].
pub struct WorkflowOrchestrator {
    safety: Arc<dyn Screen>,
    search: Arc<dyn SimilaritySearch>,
    classifier: ClassificationStage,
    recommender: RecommendationStage,
    search_limit: usize,
    timeouts: StageTimeouts,
}

impl WorkflowOrchestrator {
    pub fn new(
        safety: Arc<dyn Screen>,
        search: Arc<dyn SimilaritySearch>,
        classifier: ClassificationStage,
        recommender: RecommendationStage,
        search_limit: usize,
        timeouts: StageTimeouts,
    ) -> Self {
        Self {
            safety,
            search,
            classifier,
            recommender,
            search_limit,
            timeouts,
        }
    }

    /// Wire the production collaborators. The index is passed in so that
    /// ingestion and triage can share one in-memory backend.
    pub fn from_config(config: &AppConfig, index: Arc<dyn VectorIndex>) -> Result<Self> {
        let model: Arc<dyn LanguageModel> = Arc::new(ClaudeClient::new(&config.claude));
        let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(&config.embedding));

        Ok(Self::new(
            Arc::new(SafetyValidator::from_config(&config.safety)?),
            Arc::new(SimilaritySearchEngine::new(embedder, index, &config.search)),
            ClassificationStage::new(Arc::clone(&model)),
            RecommendationStage::new(model, config.search.max_references),
            config.search.limit,
            config.workflow.timeouts(),
        ))
    }

    pub async fn process_issue(&self, title: &str, body: &str) -> IssueState {
        self.run(IssueState::new(title, body)).await
    }

    pub async fn run(&self, state: IssueState) -> IssueState {
        let (_keep_open, cancel) = watch::channel(false);
        self.run_with_cancel(state, cancel).await
    }

    /// Drive `state` to `Done` or `Blocked`. Setting the watch value to
    /// `true` abandons the current stage and leaves the state `Cancelled`.
    pub async fn run_with_cancel(
        &self,
        mut state: IssueState,
        mut cancel: watch::Receiver<bool>,
    ) -> IssueState {
        let mut stage = Stage::InputSafety;

        while !stage.is_terminal() {
            tracing::debug!(stage = %stage, title = %state.title, "Entering stage");

            let next = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => None,
                next = self.step(stage, &mut state) => Some(next),
            };

            match next {
                Some(next) => stage = next,
                None => {
                    tracing::info!(stage = %stage, title = %state.title, "Triage cancelled");
                    state.status = RunStatus::Cancelled;
                    return state;
                }
            }
        }

        if stage == Stage::Done {
            state.status = RunStatus::Completed;
        }

        tracing::info!(
            title = %state.title,
            status = ?state.status,
            blocked = state.blocked,
            errors = state.errors.len(),
            "Triage finished"
        );
        state
    }

    async fn step(&self, stage: Stage, state: &mut IssueState) -> Stage {
        match stage {
            Stage::InputSafety => {
                let text = state.query_text();
                let screening = with_timeout(
                    "input safety",
                    self.timeouts.safety,
                    self.safety.screen(&text, Direction::Input),
                )
                .await;
                self.apply_screening(state, screening, Direction::Input, Stage::Search)
            }
            Stage::Search => {
                let text = state.query_text();
                match with_timeout(
                    "search",
                    self.timeouts.search,
                    self.search.search_similar(&text, self.search_limit),
                )
                .await
                {
                    Ok(hits) => {
                        state.similar_issues = hits.iter().filter_map(SimilarIssue::from_hit).collect();
                        tracing::info!(hits = state.similar_issues.len(), "Similar issues retrieved");
                    }
                    Err(e) => record_failure(state, "Search", e),
                }
                Stage::Classify
            }
            Stage::Classify => {
                match with_timeout(
                    "classification",
                    self.timeouts.classify,
                    self.classifier
                        .classify(&state.title, &state.body, &state.similar_issues),
                )
                .await
                {
                    Ok(classification) => {
                        tracing::info!(
                            category = %classification.category,
                            priority = %classification.priority,
                            "Issue classified"
                        );
                        state.classification = Some(classification);
                    }
                    Err(e) => record_failure(state, "Classification", e),
                }
                Stage::Recommend
            }
            Stage::Recommend => {
                match with_timeout(
                    "recommendation",
                    self.timeouts.recommend,
                    self.recommender.recommend(state),
                )
                .await
                {
                    Ok(recommendation) => {
                        tracing::info!(
                            references = recommendation.references.len(),
                            "Recommendation drafted"
                        );
                        state.recommendation = Some(recommendation);
                    }
                    Err(e) => record_failure(state, "Recommendation", e),
                }
                Stage::OutputSafety
            }
            Stage::OutputSafety => {
                let Some(summary) = state.recommendation.as_ref().map(|r| r.summary.clone()) else {
                    return Stage::Done;
                };
                let screening = with_timeout(
                    "output safety",
                    self.timeouts.safety,
                    self.safety.screen(&summary, Direction::Output),
                )
                .await;
                self.apply_screening(state, screening, Direction::Output, Stage::Done)
            }
            Stage::Done | Stage::Blocked => stage,
        }
    }

    /// Fail-closed: a detector fault blocks exactly like a failed check.
    fn apply_screening(
        &self,
        state: &mut IssueState,
        screening: Result<Screening>,
        direction: Direction,
        on_pass: Stage,
    ) -> Stage {
        match screening {
            Ok(Screening::Passed) => on_pass,
            Ok(Screening::Blocked(summary)) => {
                tracing::warn!(
                    direction = ?direction,
                    validation_type = %summary.validation_type,
                    reason = %summary.failure_reason,
                    "Blocked by safety screening"
                );
                state.block(summary);
                Stage::Blocked
            }
            Err(e) => {
                tracing::error!(direction = ?direction, error = %e, "Safety screening failed, blocking");
                state.block(validator_error(direction, &e));
                Stage::Blocked
            }
        }
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    // A dropped sender can never cancel.
    if cancel.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn record_failure(state: &mut IssueState, stage: &str, error: AppError) {
    tracing::warn!(stage, error = %error, "Stage failed, continuing");
    state.record_error(format!("{stage} error: {error}"));
}

fn validator_error(direction: Direction, error: &AppError) -> ValidationSummary {
    ValidationSummary {
        validation_type: match direction {
            Direction::Input => ValidationType::ValidatorErrorInput,
            Direction::Output => ValidationType::ValidatorErrorOutput,
        },
        failure_reason: format!("Safety screening could not complete: {error}"),
        score: None,
        error_spans: None,
    }
}
