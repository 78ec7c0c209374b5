use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use crate::error::Result;
use crate::models::ErrorSpan;
use crate::safety::{TextScorer, ValidationResult, Validator, ValidatorSummary};

struct InjectionPattern {
    regex: Regex,
    weight: f32,
    description: &'static str,
}

fn pattern(regex: &str, weight: f32, description: &'static str) -> InjectionPattern {
    InjectionPattern {
        regex: Regex::new(regex).expect("valid injection pattern"),
        weight,
        description,
    }
}

static INJECTION_PATTERNS: LazyLock<Vec<InjectionPattern>> = LazyLock::new(|| {
    vec![
        // Instruction override
        pattern(
            r"(?i)\b(?:ignore|disregard|override)\s+(?:all\s+)?(?:the\s+)?(?:previous|prior|above|earlier)\s+(?:instructions?|rules?|prompts?|directions?)",
            1.0,
            "Instruction override",
        ),
        pattern(
            r"(?i)\bforget\s+(?:everything|all|your)\s+(?:previous\s+|prior\s+)?(?:instructions?|rules?|training)",
            0.95,
            "Instruction reset",
        ),
        pattern(r"(?i)\bnew\s+instructions?\s*:", 0.6, "Injected instructions"),
        // Persona hijack
        pattern(r"\bDAN\b|(?i:\bdo\s+anything\s+now\b)", 0.95, "DAN persona"),
        pattern(r"(?i)\bdeveloper\s+mode\b", 0.9, "Developer mode request"),
        pattern(r"(?i)\bjailbr(?:eak|oken)\b", 0.9, "Explicit jailbreak"),
        pattern(r"(?i)\byou\s+are\s+now\s+(?:a|an|in)\b", 0.6, "Role reassignment"),
        pattern(r"(?i)\bpretend\s+(?:that\s+)?(?:you\s+are|to\s+be)\b", 0.6, "Role play request"),
        pattern(
            r"(?i)\bwithout\s+(?:any\s+)?(?:restrictions|filters|limitations|guidelines)\b",
            0.6,
            "Restriction removal",
        ),
        // Prompt extraction
        pattern(
            r"(?i)\b(?:reveal|print|show|repeat)\s+(?:me\s+)?(?:your|the)\s+(?:system\s+prompt|hidden\s+instructions|initial\s+instructions)",
            0.95,
            "System prompt extraction",
        ),
        // Chat-template tokens
        pattern(r"<<SYS>>|\[INST\]|<\|im_start\|>|<\|im_end\|>|<\|system\|>", 1.0, "Chat template token"),
    ]
});

/// In-process jailbreak scorer over a catalogue of prompt-injection patterns.
#[derive(Debug, Default)]
pub struct PatternScorer;

impl PatternScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score_text(text: &str) -> f32 {
        let clean_probability: f32 = INJECTION_PATTERNS
            .iter()
            .filter(|p| p.regex.is_match(text))
            .map(|p| 1.0 - p.weight)
            .product();
        1.0 - clean_probability
    }

    /// Spans of every matched pattern, for reporting.
    pub fn matches(text: &str) -> Vec<ErrorSpan> {
        INJECTION_PATTERNS
            .iter()
            .flat_map(|p| {
                p.regex.find_iter(text).map(move |m| ErrorSpan {
                    start: m.start(),
                    end: m.end(),
                    reason: p.description.to_string(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl TextScorer for PatternScorer {
    async fn score(&self, text: &str) -> Result<f32> {
        Ok(Self::score_text(text))
    }
}

/// Whole-text jailbreak check.
pub struct JailbreakValidator {
    scorer: Arc<dyn TextScorer>,
    threshold: f32,
}

impl JailbreakValidator {
    pub fn new(scorer: Arc<dyn TextScorer>, threshold: f32) -> Self {
        Self { scorer, threshold }
    }
}

#[async_trait]
impl Validator for JailbreakValidator {
    fn name(&self) -> &str {
        "DetectJailbreak"
    }

    async fn validate(&self, text: &str) -> Result<ValidationResult> {
        let score = self.scorer.score(text).await?;
        if score < self.threshold {
            return Ok(ValidationResult::passed());
        }

        Ok(ValidationResult::failed(ValidatorSummary {
            validator_name: self.name().to_string(),
            failure_reason: format!(
                "Prompt contains a potential jailbreak attempt (score {score:.2}, threshold {:.2})",
                self.threshold
            ),
            error_spans: PatternScorer::matches(text),
            score: Some(score),
        }))
    }
}
