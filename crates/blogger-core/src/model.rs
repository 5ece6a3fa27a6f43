//! Chat-completions client for the hosted model.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{BloggerConfig, BloggerError, ModelError, SecretValue, redact_secrets};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Anything that can turn a conversation into a single completion.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client for the configured endpoint.
#[derive(Debug, Clone)]
pub struct ImagineClient {
    client: Client,
    url: String,
    api_key: SecretValue,
    model: String,
    max_tokens: u32,
}

impl ImagineClient {
    pub fn new(config: &BloggerConfig) -> Result<Self, BloggerError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| {
                BloggerError::InvalidConfiguration(format!("failed to create HTTP client: {err}"))
            })?;

        Ok(Self {
            client,
            url: completions_url(&config.api_endpoint),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChatModel for ImagineClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        let body = CompletionRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|err| ModelError::retryable(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|err| ModelError::terminal(format!("malformed completion response: {err}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ModelError::terminal("model did not return any content"))?;

        debug!(model = %self.model, chars = content.len(), "completion received");
        Ok(content)
    }
}

/// Append `/chat/completions` unless the endpoint already points at it.
pub fn completions_url(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    if trimmed.ends_with("/chat/completions") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/chat/completions")
    }
}

fn classify_status(status: StatusCode, body: &str) -> ModelError {
    let detail = redact_secrets(body.trim());
    let reason = if detail.is_empty() {
        format!("endpoint returned {status}")
    } else {
        format!("endpoint returned {status}: {detail}")
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ModelError::terminal(reason),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            ModelError::retryable(reason)
        }
        status if status.is_server_error() => ModelError::retryable(reason),
        _ => ModelError::terminal(reason),
    }
}

/// Retry policy applied around a [`ChatModel`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &BloggerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: config.retry_backoff,
            max_backoff: MAX_BACKOFF,
        }
    }
}

/// Retries retryable failures of the inner model with exponential backoff.
pub struct RetryingModel {
    inner: Arc<dyn ChatModel>,
    policy: RetryPolicy,
}

impl RetryingModel {
    pub fn new(inner: Arc<dyn ChatModel>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ChatModel for RetryingModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        let mut attempt = 0;
        let mut backoff = self.policy.initial_backoff;

        loop {
            match self.inner.complete(messages).await {
                Ok(content) => return Ok(content),
                Err(err) if err.retryable && attempt < self.policy.max_retries => {
                    attempt += 1;
                    warn!(
                        error = %err,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "model call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.policy.max_backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
