use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::llm::{prompt, LanguageModel};
use crate::models::{IssueState, Recommendation};

/// Drafts the maintainer-facing recommendation from the classified issue and
/// its deduplicated reference links.
pub struct RecommendationStage {
    model: Arc<dyn LanguageModel>,
    max_references: usize,
}

impl RecommendationStage {
    pub fn new(model: Arc<dyn LanguageModel>, max_references: usize) -> Self {
        Self {
            model,
            max_references,
        }
    }

    pub async fn recommend(&self, state: &IssueState) -> Result<Recommendation> {
        let references = state.reference_urls(self.max_references);
        let prompt = prompt::summary_prompt(
            &state.title,
            &state.body,
            state.classification.as_ref(),
            &state.similar_issues,
            &references,
        );

        let reply = self.model.invoke(&prompt).await?;
        let summary = normalise(&reply);
        if summary.is_empty() {
            return Err(AppError::Recommendation(
                "model returned an empty summary".to_string(),
            ));
        }

        Ok(Recommendation {
            summary,
            references,
        })
    }
}

/// Collapse the reply into one trimmed string, dropping blank edge lines.
fn normalise(reply: &str) -> String {
    reply
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SimilarIssue;
    use crate::workflow::classify::tests::ScriptedModel;
    use serde_json::json;

    fn neighbour(url: &str) -> SimilarIssue {
        SimilarIssue {
            issue_number: Some(7),
            repo: Some("scikit-learn".to_string()),
            owner: Some("scikit-learn".to_string()),
            title: Some("HuberRegressor fails".to_string()),
            url: Some(url.to_string()),
            comment_id: Some(1),
            chunk_text: Some("epsilon must be > 1".to_string()),
            score: 0.5,
            is_bug: Some(true),
            is_feature: Some(false),
        }
    }

    #[tokio::test]
    async fn test_references_are_deduplicated_and_capped() {
        let model = ScriptedModel::new(Ok(json!({})), Ok("  Check epsilon.  \n\n".to_string()));
        let stage = RecommendationStage::new(model.clone(), 4);

        let mut state = IssueState::new("Bug in HuberRegressor", "fit fails");
        state.similar_issues = ["a", "b", "a", "c", "b", "d", "e"]
            .iter()
            .map(|u| neighbour(&format!("https://github.com/o/r/issues/{u}")))
            .collect();

        let recommendation = stage.recommend(&state).await.unwrap();

        assert_eq!(recommendation.summary, "Check epsilon.");
        assert_eq!(
            recommendation.references,
            vec![
                "https://github.com/o/r/issues/a",
                "https://github.com/o/r/issues/b",
                "https://github.com/o/r/issues/c",
                "https://github.com/o/r/issues/d",
            ]
        );
        let prompt = model.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("- https://github.com/o/r/issues/d"));
        assert!(!prompt.contains("issues/e"));
    }

    #[tokio::test]
    async fn test_blank_reply_is_recommendation_error() {
        let stage = RecommendationStage::new(ScriptedModel::new(Ok(json!({})), Ok(" \n ".to_string())), 4);
        let err = stage.recommend(&IssueState::new("t", "b")).await.unwrap_err();
        assert!(matches!(err, AppError::Recommendation(_)));
    }

    #[test]
    fn test_normalise_keeps_inner_lines() {
        assert_eq!(normalise("\n  First.  \nSecond.\n\n"), "First.\nSecond.");
    }
}
