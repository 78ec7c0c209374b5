use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use crate::error::Result;
use crate::models::ErrorSpan;
use crate::safety::{TextScorer, ValidationResult, Validator, ValidatorSummary};

/// Weighted abusive terms. A sentence's score is the noisy-or of its matches.
static TOXIC_TERMS: LazyLock<Vec<(Regex, f32)>> = LazyLock::new(|| {
    [
        (r"(?i)\bidiot(?:s|ic)?\b", 0.9),
        (r"(?i)\bmorons?\b", 0.9),
        (r"(?i)\bimbeciles?\b", 0.9),
        (r"(?i)\bf+u+c+k\w*", 0.95),
        (r"(?i)\bshit\w*", 0.8),
        (r"(?i)\bbitch\w*", 0.9),
        (r"(?i)\bbastards?\b", 0.85),
        (r"(?i)\bassholes?\b", 0.95),
        (r"(?i)\bstupid(?:ity)?\b", 0.8),
        (r"(?i)\bdumb\b", 0.7),
        (r"(?i)\bshut\s+up\b", 0.7),
        (r"(?i)\bhate\s+you\b", 0.8),
        (r"(?i)\bhate\b", 0.5),
        (r"(?i)\bpathetic\b", 0.7),
        (r"(?i)\blosers?\b", 0.7),
        (r"(?i)\bworthless\b", 0.6),
        (r"(?i)\btrash\b", 0.6),
        (r"(?i)\bgarbage\b", 0.6),
        (r"(?i)\bcrap(?:py)?\b", 0.6),
        (r"(?i)\bsucks?\b", 0.5),
        (r"(?i)\bdamn\b", 0.4),
        (r"(?i)\buseless\b", 0.25),
        (r"(?i)\bterrible\b", 0.2),
        (r"(?i)\bawful\b", 0.2),
    ]
    .into_iter()
    .map(|(pattern, weight)| (Regex::new(pattern).expect("valid toxicity pattern"), weight))
    .collect()
});

/// Technical phrases that reuse abusive words; masked before scoring.
static TECHNICAL_PHRASES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bgarbage[\s-]+collect\w*|\bgarbage[\s-]+in\b|\btrash[\s-]+(?:can|bin|folder)\b|\bdumb[\s-]+(?:terminal|pipe|pointer)s?\b",
    )
    .expect("valid technical phrase pattern")
});

static SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^.!?\n]+[.!?]*").expect("valid sentence pattern"));

/// Byte ranges of the non-blank sentences in `text`.
pub fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    SENTENCE
        .find_iter(text)
        .filter(|m| !m.as_str().trim().is_empty())
        .map(|m| {
            let raw = m.as_str();
            let leading = raw.len() - raw.trim_start().len();
            let trailing = raw.len() - raw.trim_end().len();
            (m.start() + leading, m.end() - trailing)
        })
        .collect()
}

/// In-process scorer over a weighted abuse lexicon.
#[derive(Debug, Default)]
pub struct LexiconScorer;

impl LexiconScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score_text(text: &str) -> f32 {
        let masked = TECHNICAL_PHRASES.replace_all(text, " ");
        let clean_probability: f32 = TOXIC_TERMS
            .iter()
            .filter(|(pattern, _)| pattern.is_match(&masked))
            .map(|(_, weight)| 1.0 - weight)
            .product();
        1.0 - clean_probability
    }
}

#[async_trait]
impl TextScorer for LexiconScorer {
    async fn score(&self, text: &str) -> Result<f32> {
        Ok(Self::score_text(text))
    }
}

/// Sentence-level toxicity check: fails when any sentence scores at or above
/// the threshold.
pub struct ToxicityValidator {
    scorer: Arc<dyn TextScorer>,
    threshold: f32,
}

impl ToxicityValidator {
    pub fn new(scorer: Arc<dyn TextScorer>, threshold: f32) -> Self {
        Self { scorer, threshold }
    }
}

#[async_trait]
impl Validator for ToxicityValidator {
    fn name(&self) -> &str {
        "ToxicLanguage"
    }

    async fn validate(&self, text: &str) -> Result<ValidationResult> {
        let mut spans = Vec::new();
        let mut sentences = Vec::new();
        let mut max_score = 0.0f32;

        for (start, end) in sentence_spans(text) {
            let sentence = &text[start..end];
            let score = self.scorer.score(sentence).await?;
            max_score = max_score.max(score);
            if score >= self.threshold {
                spans.push(ErrorSpan {
                    start,
                    end,
                    reason: format!("Toxic language detected (score {score:.2})"),
                });
                sentences.push(sentence);
            }
        }

        if spans.is_empty() {
            return Ok(ValidationResult::passed());
        }

        let listed = sentences
            .iter()
            .map(|s| format!("- {s}"))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ValidationResult::failed(ValidatorSummary {
            validator_name: self.name().to_string(),
            failure_reason: format!("The following sentences were found to be toxic:\n\n{listed}"),
            error_spans: spans,
            score: Some(max_score),
        }))
    }
}
