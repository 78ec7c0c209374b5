pub mod claude;
pub mod prompt;

use async_trait::async_trait;

use crate::error::Result;

pub use claude::ClaudeClient;

/// Declared output schema for a structured model call.
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
}

/// Opaque language model used by the classification and recommendation stages.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Free-text completion.
    async fn invoke(&self, prompt: &str) -> Result<String>;

    /// Completion constrained to `schema`. Fails with `SchemaViolation`
    /// when the model does not produce a record.
    async fn invoke_structured(
        &self,
        prompt: &str,
        schema: &OutputSchema,
    ) -> Result<serde_json::Value>;
}
