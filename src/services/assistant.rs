use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

use crate::config::AssistantSettings;

/// Assistant client construction errors
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Chat message sent to the ranking assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self { format_type: "json_object".into() }
    }

    pub fn is_json_object(&self) -> bool {
        self.format_type == "json_object"
    }
}

/// One completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

/// Assistant reply: parsed JSON when a JSON response format was requested and the
/// content parses strictly, raw text otherwise
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantReply {
    Text(String),
    Structured(serde_json::Value),
}

/// Ranking assistant client.
///
/// Implementations return `None` on any failure instead of an error; callers
/// treat silence as "no opinion".
#[async_trait]
pub trait RankingAssistant: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Option<AssistantReply>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletionRaw {
    choices: Vec<ChoiceRaw>,
}

#[derive(Debug, Deserialize)]
struct ChoiceRaw {
    message: MessageRaw,
}

#[derive(Debug, Deserialize)]
struct MessageRaw {
    #[serde(default)]
    content: Option<String>,
}

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// OpenAI-compatible chat completions client
pub struct OpenAiAssistant {
    http_client: Client,
    api_key: String,
    base_url: String,
    limiter: DirectRateLimiter,
}

impl OpenAiAssistant {
    pub fn new(settings: &AssistantSettings) -> Result<Self, AssistantError> {
        if settings.api_key.trim().is_empty() {
            return Err(AssistantError::Config(
                "assistant API key must be set (assistant.api_key or OPENAI_API_KEY)".into(),
            ));
        }
        let rpm = NonZeroU32::new(settings.requests_per_minute)
            .ok_or_else(|| AssistantError::Config("requests_per_minute must be > 0".into()))?;
        let http_client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AssistantError::Config(format!("failed to build HTTP client: {}", e)))?;

        tracing::info!(rpm = settings.requests_per_minute, "Initialized ranking assistant client");

        Ok(Self {
            http_client,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::direct(Quota::per_minute(rpm)),
        })
    }
}

#[async_trait]
impl RankingAssistant for OpenAiAssistant {
    async fn complete(&self, request: CompletionRequest) -> Option<AssistantReply> {
        self.limiter.until_ready().await;
        let start = std::time::Instant::now();

        let response = match self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Assistant request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "Assistant API error");
            return None;
        }

        let raw: ChatCompletionRaw = match response.json().await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse assistant response");
                return None;
            }
        };

        let content = raw.choices.into_iter().next().and_then(|c| c.message.content)?;

        tracing::debug!(
            model = %request.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "Assistant chat completion"
        );

        match &request.response_format {
            Some(format) if format.is_json_object() => match serde_json::from_str(&content) {
                Ok(value) => Some(AssistantReply::Structured(value)),
                Err(e) => {
                    tracing::debug!(error = %e, "Assistant content is not strict JSON, returning text");
                    Some(AssistantReply::Text(content))
                }
            },
            _ => Some(AssistantReply::Text(content)),
        }
    }
}
