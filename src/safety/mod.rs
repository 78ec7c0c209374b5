pub mod jailbreak;
pub mod remote;
pub mod secrets;
pub mod toxicity;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{DetectorBackend, SafetyConfig};
use crate::error::{AppError, Result};
use crate::models::{ErrorSpan, ValidationSummary, ValidationType};

pub use jailbreak::{JailbreakValidator, PatternScorer};
pub use remote::RemoteScorer;
pub use secrets::SecretsValidator;
pub use toxicity::{LexiconScorer, ToxicityValidator};

/// One failing validator's explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorSummary {
    pub validator_name: String,
    pub failure_reason: String,
    pub error_spans: Vec<ErrorSpan>,
    pub score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub validation_passed: bool,
    pub summaries: Vec<ValidatorSummary>,
}

impl ValidationResult {
    pub fn passed() -> Self {
        Self {
            validation_passed: true,
            summaries: Vec::new(),
        }
    }

    pub fn failed(summary: ValidatorSummary) -> Self {
        Self {
            validation_passed: false,
            summaries: vec![summary],
        }
    }
}

/// A single text-safety check. Pure given a fixed detector and threshold.
#[async_trait]
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;

    async fn validate(&self, text: &str) -> Result<ValidationResult>;
}

/// Probability-like score in `[0, 1]` that `text` belongs to the detected class.
#[async_trait]
pub trait TextScorer: Send + Sync {
    async fn score(&self, text: &str) -> Result<f32>;
}

/// Which side of the pipeline is being screened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Screening {
    Passed,
    Blocked(ValidationSummary),
}

/// Ordered screening of input and output text.
#[async_trait]
pub trait Screen: Send + Sync {
    /// Backend faults surface as `AppError::SafetyCheck`; the caller decides
    /// the fail-closed policy.
    async fn screen(&self, text: &str, direction: Direction) -> Result<Screening>;
}

pub struct SafetyValidator {
    jailbreak: Arc<dyn Validator>,
    input_toxicity: Arc<dyn Validator>,
    output_toxicity: Arc<dyn Validator>,
    secrets: Arc<dyn Validator>,
}

impl SafetyValidator {
    pub fn new(
        jailbreak: Arc<dyn Validator>,
        input_toxicity: Arc<dyn Validator>,
        output_toxicity: Arc<dyn Validator>,
        secrets: Arc<dyn Validator>,
    ) -> Self {
        Self {
            jailbreak,
            input_toxicity,
            output_toxicity,
            secrets,
        }
    }

    pub fn from_config(config: &SafetyConfig) -> Result<Self> {
        let toxicity_scorer: Arc<dyn TextScorer> = match config.toxicity_backend {
            DetectorBackend::Local => Arc::new(LexiconScorer::new()),
            DetectorBackend::Remote => Arc::new(RemoteScorer::new(required_url(
                config.toxicity_url.as_deref(),
                "toxicity",
            )?)),
        };
        let jailbreak_scorer: Arc<dyn TextScorer> = match config.jailbreak_backend {
            DetectorBackend::Local => Arc::new(PatternScorer::new()),
            DetectorBackend::Remote => Arc::new(RemoteScorer::new(required_url(
                config.jailbreak_url.as_deref(),
                "jailbreak",
            )?)),
        };

        Ok(Self::new(
            Arc::new(JailbreakValidator::new(jailbreak_scorer, config.jailbreak_threshold)),
            Arc::new(ToxicityValidator::new(
                Arc::clone(&toxicity_scorer),
                config.input_toxicity_threshold,
            )),
            Arc::new(ToxicityValidator::new(
                toxicity_scorer,
                config.output_toxicity_threshold,
            )),
            Arc::new(SecretsValidator::new()),
        ))
    }

    pub async fn check_jailbreak(&self, text: &str) -> Result<ValidationResult> {
        self.jailbreak.validate(text).await
    }

    /// Toxicity at the input threshold.
    pub async fn check_toxicity(&self, text: &str) -> Result<ValidationResult> {
        self.input_toxicity.validate(text).await
    }

    /// Toxicity at the stricter output threshold.
    pub async fn check_output_toxicity(&self, text: &str) -> Result<ValidationResult> {
        self.output_toxicity.validate(text).await
    }

    pub async fn check_secrets(&self, text: &str) -> Result<ValidationResult> {
        self.secrets.validate(text).await
    }

    fn checks(&self, direction: Direction) -> Vec<(&dyn Validator, ValidationType)> {
        match direction {
            Direction::Input => vec![
                (self.jailbreak.as_ref(), ValidationType::DetectJailbreak),
                (self.input_toxicity.as_ref(), ValidationType::ToxicLanguageInput),
                (self.secrets.as_ref(), ValidationType::SecretsPresentInput),
            ],
            Direction::Output => vec![
                (self.output_toxicity.as_ref(), ValidationType::ToxicLanguageOutput),
                (self.secrets.as_ref(), ValidationType::SecretsPresentOutput),
            ],
        }
    }
}

fn required_url(url: Option<&str>, detector: &str) -> Result<String> {
    url.map(str::to_string)
        .ok_or_else(|| AppError::Config(format!("no URL configured for remote {detector} detector")))
}

#[async_trait]
impl Screen for SafetyValidator {
    async fn screen(&self, text: &str, direction: Direction) -> Result<Screening> {
        for (validator, validation_type) in self.checks(direction) {
            let result = validator.validate(text).await.map_err(|e| match e {
                AppError::SafetyCheck(_) => e,
                other => AppError::SafetyCheck(format!("{}: {other}", validator.name())),
            })?;

            if result.validation_passed {
                continue;
            }

            let summary = result.summaries.into_iter().next();
            tracing::info!(
                validator = validator.name(),
                validation_type = %validation_type,
                "Safety check failed"
            );
            return Ok(Screening::Blocked(ValidationSummary {
                validation_type,
                failure_reason: summary
                    .as_ref()
                    .map(|s| s.failure_reason.clone())
                    .unwrap_or_else(|| format!("{} failed", validator.name())),
                score: summary.as_ref().and_then(|s| s.score),
                error_spans: summary
                    .map(|s| s.error_spans)
                    .filter(|spans| !spans.is_empty()),
            }));
        }

        Ok(Screening::Passed)
    }
}
