/// LLM Client: the single point of entry for all completion-provider calls.
///
/// ARCHITECTURAL RULE: No other module may call the provider API directly.
/// Everything goes through a `CompletionProvider`; `LlmClient` is the HTTP one.
///
/// A single `complete()` performs exactly one HTTP request. Retrying is the
/// caller's decision and goes through [`retry::with_retry`].
use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
pub mod fake;
pub mod prompts;
pub mod retry;

const REQUEST_TIMEOUT_SECS: u64 = 15;
/// How much of an error body is kept in `LlmError::Api`.
const ERROR_BODY_PREVIEW: usize = 300;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Provider returned empty content")]
    EmptyContent,
}

impl LlmError {
    /// Stable error kind surfaced to callers, e.g. `provider_http_503`.
    pub fn kind(&self) -> String {
        match self {
            LlmError::Http(_) => "provider_network".to_string(),
            LlmError::Api { status, .. } => format!("provider_http_{status}"),
            LlmError::Parse(_) => "provider_parse".to_string(),
            LlmError::EmptyContent => "provider_empty".to_string(),
        }
    }

    /// Transient failures worth another attempt: network errors, empty
    /// completions, 408, 429 and 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Http(_) | LlmError::EmptyContent => true,
            LlmError::Api { status, .. } => matches!(status, 408 | 429 | 500..=599),
            LlmError::Parse(_) => false,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Provider-agnostic request types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// The one operation the shaping core consumes from the outside world.
///
/// Carried in `AppState` as `Arc<dyn CompletionProvider>` so tests can swap
/// in a scripted provider.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

// ────────────────────────────────────────────────────────────────────────────
// OpenAI-compatible wire format
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatCompletionResponse {
    /// Text of the first choice, if the provider sent any.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// HTTP completion provider speaking the OpenAI chat-completions dialect.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    url: String,
    model: String,
    api_keys: Vec<String>,
}

impl LlmClient {
    pub fn new(url: String, model: String, api_keys: Vec<String>) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            url,
            model,
            api_keys,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Picks one key from the pool at random to spread rate limits.
    fn pick_key(&self) -> &str {
        match self.api_keys.len() {
            0 => "",
            1 => &self.api_keys[0],
            n => &self.api_keys[rand::thread_rng().gen_range(0..n)],
        }
    }
}

#[async_trait]
impl CompletionProvider for LlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = ChatCompletionBody {
            model: &self.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: &request.messages,
        };

        debug!(
            "Provider request: model={}, messages={}, max_tokens={}",
            self.model,
            request.messages.len(),
            request.max_tokens
        );

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.pick_key())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ProviderError>(&text)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| text.chars().take(ERROR_BODY_PREVIEW).collect());
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text)?;

        if let Some(usage) = &parsed.usage {
            debug!(
                "Provider call succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        parsed
            .text()
            .map(str::to_string)
            .ok_or(LlmError::EmptyContent)
    }
}
