use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::llm::{prompt, LanguageModel, OutputSchema};
use crate::models::{Classification, SimilarIssue};

const CLASSIFY_TOOL: &str = "classify_issue";

const CATEGORIES: &[&str] = &["bug", "feature", "documentation", "question", "performance", "other"];
const PRIORITIES: &[&str] = &["low", "medium", "high", "critical"];

/// Raw record returned by the model, before normalisation.
#[derive(Debug, Deserialize)]
struct ClassificationRecord {
    category: String,
    priority: String,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    assignee: Option<String>,
}

/// Derives category, priority, labels and assignee from the issue text and
/// its retrieved neighbours.
pub struct ClassificationStage {
    model: Arc<dyn LanguageModel>,
    schema: OutputSchema,
}

impl ClassificationStage {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            schema: classification_schema(),
        }
    }

    /// Either a complete classification or an error; never a partial record.
    pub async fn classify(
        &self,
        title: &str,
        body: &str,
        similar_issues: &[SimilarIssue],
    ) -> Result<Classification> {
        let prompt = prompt::classification_prompt(title, body, similar_issues);
        let value = self.model.invoke_structured(&prompt, &self.schema).await?;

        let record: ClassificationRecord = serde_json::from_value(value)
            .map_err(|e| AppError::SchemaViolation(format!("{CLASSIFY_TOOL}: {e}")))?;

        let category = record.category.trim().to_lowercase();
        let priority = record.priority.trim().to_lowercase();
        if category.is_empty() || priority.is_empty() {
            return Err(AppError::SchemaViolation(format!(
                "{CLASSIFY_TOOL}: category and priority must be non-empty"
            )));
        }
        if !CATEGORIES.contains(&category.as_str()) {
            return Err(AppError::Classification(format!(
                "unknown category '{category}', expected one of {CATEGORIES:?}"
            )));
        }
        if !PRIORITIES.contains(&priority.as_str()) {
            return Err(AppError::Classification(format!(
                "unknown priority '{priority}', expected one of {PRIORITIES:?}"
            )));
        }

        let labels: BTreeSet<String> = record
            .labels
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();

        let assignee = record
            .assignee
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| "unassigned".to_string());

        Ok(Classification {
            category,
            priority,
            labels,
            assignee,
        })
    }
}

fn classification_schema() -> OutputSchema {
    OutputSchema {
        name: CLASSIFY_TOOL.to_string(),
        description: "Record the triage classification of a GitHub issue.".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "category": {
                    "type": "string",
                    "enum": CATEGORIES
                },
                "priority": {
                    "type": "string",
                    "enum": PRIORITIES
                },
                "labels": {
                    "type": "array",
                    "items": { "type": "string" }
                },
                "assignee": { "type": "string" }
            },
            "required": ["category", "priority", "labels", "assignee"]
        }),
    }
}
