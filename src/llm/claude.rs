use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::ClaudeConfig;
use crate::error::{AppError, Result};
use crate::llm::{LanguageModel, OutputSchema};

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str =
    "You are an experienced maintainer triaging GitHub issues for an open-source project.";

/// Backoff policy for 429 and 5xx responses.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

pub struct ClaudeClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    retry: RetryPolicy,
}

impl ClaudeClient {
    pub fn new(config: &ClaudeConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: CLAUDE_API_URL.to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            retry: RetryPolicy {
                enabled: config.rate_limit_retry,
                max_retries: config.rate_limit_max_retries,
                initial_backoff: Duration::from_secs(config.rate_limit_backoff_secs),
            },
        }
    }

    pub async fn send_message(&self, request: &MessagesRequest) -> Result<MessagesResponse> {
        let mut attempt = 0u32;
        let mut backoff = self.retry.initial_backoff;

        loop {
            match self.send_once(request).await {
                Err(e @ (AppError::ClaudeRateLimited(_) | AppError::ClaudeTransient(_)))
                    if self.retry.enabled && attempt < self.retry.max_retries =>
                {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying Claude request"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                other => return other,
            }
        }
    }

    async fn send_once(&self, request: &MessagesRequest) -> Result<MessagesResponse> {
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("API returned {status}: {body}");
            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                AppError::ClaudeRateLimited(message)
            } else if status.is_server_error() {
                AppError::ClaudeTransient(message)
            } else {
                AppError::ClaudeApi(message)
            });
        }

        let body = response.json::<MessagesResponse>().await?;
        tracing::debug!(
            input_tokens = body.usage.input_tokens,
            output_tokens = body.usage.output_tokens,
            stop_reason = ?body.stop_reason,
            "Claude response"
        );
        Ok(body)
    }

    fn request(&self, prompt: &str) -> MessagesRequest {
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: MessageContent::Text(prompt.to_string()),
            }],
            tools: Vec::new(),
            tool_choice: None,
        }
    }
}

#[async_trait]
impl LanguageModel for ClaudeClient {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        let response = self.send_message(&self.request(prompt)).await?;
        Ok(extract_text(&response.content))
    }

    async fn invoke_structured(
        &self,
        prompt: &str,
        schema: &OutputSchema,
    ) -> Result<serde_json::Value> {
        let mut request = self.request(prompt);
        request.tools = vec![ToolDefinition {
            name: schema.name.clone(),
            description: schema.description.clone(),
            input_schema: schema.schema.clone(),
        }];
        request.tool_choice = Some(ToolChoice::Tool {
            name: schema.name.clone(),
        });

        let response = self.send_message(&request).await?;
        extract_tool_input(&response.content, &schema.name)
    }
}

/// Join every text block into one string.
pub fn extract_text(content: &[ContentBlock]) -> String {
    content
        .iter()
        .filter_map(|block| {
            if let ContentBlock::Text { text } = block {
                Some(text.as_str())
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Input of the first call to `tool_name`.
pub fn extract_tool_input(content: &[ContentBlock], tool_name: &str) -> Result<serde_json::Value> {
    content
        .iter()
        .find_map(|block| match block {
            ContentBlock::ToolUse { name, input, .. } if name == tool_name => Some(input.clone()),
            _ => None,
        })
        .ok_or_else(|| {
            AppError::SchemaViolation(format!("model returned no `{tool_name}` tool call"))
        })
}

// --- Request types ---

#[derive(Debug, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    Tool { name: String },
}

// --- Response types ---

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}
