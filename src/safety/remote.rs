use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::safety::TextScorer;

/// HTTP classifier: `POST {url}` with `{"text": ...}`, answering `{"score": f32}`.
pub struct RemoteScorer {
    client: Client,
    url: String,
}

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    score: f32,
}

impl RemoteScorer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl TextScorer for RemoteScorer {
    async fn score(&self, text: &str) -> Result<f32> {
        let response = self
            .client
            .post(&self.url)
            .json(&ScoreRequest { text })
            .send()
            .await
            .map_err(|e| AppError::SafetyCheck(format!("{}: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::SafetyCheck(format!(
                "{} returned {status}: {body}",
                self.url
            )));
        }

        let body = response
            .json::<ScoreResponse>()
            .await
            .map_err(|e| AppError::SafetyCheck(format!("{}: invalid response: {e}", self.url)))?;

        if !(0.0..=1.0).contains(&body.score) {
            return Err(AppError::SafetyCheck(format!(
                "{}: score {} outside [0, 1]",
                self.url, body.score
            )));
        }
        Ok(body.score)
    }
}
