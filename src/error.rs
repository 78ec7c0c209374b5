use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Webhook verification failed: {0}")]
    WebhookVerification(String),

    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    #[error("Claude API error: {0}")]
    ClaudeApi(String),

    #[error("Claude API rate limited: {0}")]
    ClaudeRateLimited(String),

    #[error("Claude API transient error: {0}")]
    ClaudeTransient(String),

    #[error("Embedding provider error: {0}")]
    Embedding(String),

    #[error("Vector index error: {0}")]
    Index(String),

    /// Structured model output could not be parsed into the declared schema.
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    #[error("{0}")]
    Classification(String),

    #[error("{0}")]
    Recommendation(String),

    /// The safety detector backend itself failed.
    #[error("Safety check failed: {0}")]
    SafetyCheck(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<octocrab::Error> for AppError {
    fn from(e: octocrab::Error) -> Self {
        AppError::GitHubApi(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Run `fut` with a deadline, mapping expiry to [`AppError::Timeout`].
pub async fn with_timeout<T, F>(operation: &'static str, after: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout { operation, after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: Result<()> = with_timeout("slow call", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, AppError::Timeout { operation: "slow call", .. }));
        assert!(err.to_string().starts_with("slow call timed out"));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_inner_error_through() {
        let result: Result<()> = with_timeout("call", Duration::from_secs(1), async {
            Err(AppError::Index("down".to_string()))
        })
        .await;
        assert_eq!(result.unwrap_err().to_string(), "Vector index error: down");
    }
}
