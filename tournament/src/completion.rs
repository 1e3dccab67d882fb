//! Chat-completion transport for participant turns.
//!
//! Phases talk to an OpenAI-compatible chat endpoint through the
//! [`Completion`] trait so tests can script replies without a network. The
//! structured variants expect a JSON object in the reply, tolerating the
//! markdown code fences models like to wrap it in.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Reply length cap, roughly 200 words per turn.
pub const DEFAULT_MAX_TOKENS: u32 = 650;

/// Error type for completion calls.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion endpoint reported an error: {0}")]
    Api(String),

    #[error("completion response held no choices")]
    NoChoices,

    #[error("completion call timed out after {0:?}")]
    Timeout(Duration),

    #[error("structured response did not parse: {0}")]
    Parse(String),
}

/// Result type for completion calls.
pub type CompletionResult<T> = Result<T, CompletionError>;

/// A chat model that can take one system + user turn and reply with text.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Run one exchange: `role` is the system prompt, `task` the user prompt.
    async fn complete(
        &self,
        role: &str,
        task: &str,
        temperature: f64,
        timeout: Duration,
    ) -> CompletionResult<String>;
}

/// Run an exchange and parse the reply as JSON into `T`.
///
/// The reply may wrap the JSON in markdown fences; anything the extractor
/// cannot peel off is handed to serde as-is, so a malformed reply surfaces
/// as [`CompletionError::Parse`] with a snippet of what came back.
pub async fn complete_structured<T: DeserializeOwned>(
    client: &dyn Completion,
    role: &str,
    task: &str,
    temperature: f64,
    timeout: Duration,
) -> CompletionResult<T> {
    let raw = client.complete(role, task, temperature, timeout).await?;
    let json = extract_json(&raw);
    serde_json::from_str(json).map_err(|err| {
        let snippet: String = raw.chars().take(240).collect();
        CompletionError::Parse(format!("{err} (reply: {snippet})"))
    })
}

/// Peel markdown code fences off a reply that should contain JSON.
///
/// The fenced block runs from the line after the first ``` to the last ```.
/// When the bounds come out degenerate (one fence, fence without a newline,
/// nothing between the fences) the reply is returned untouched and the
/// caller's parser gets to complain.
pub fn extract_json(content: &str) -> &str {
    let mut start = 0;
    let mut end = content.len();

    if let Some(fence) = content.find("```") {
        let after_fence = fence + 3;
        start = match content[after_fence..].find('\n') {
            Some(newline) => after_fence + newline + 1,
            None => content.len(),
        };
    }

    if let Some(fence) = content.rfind("```") {
        let mut trimmed = fence;
        while trimmed > 0 && matches!(content.as_bytes()[trimmed - 1], b'\n' | b'\r') {
            trimmed -= 1;
        }
        end = trimmed;
    }

    if start >= end || start >= content.len() || end == 0 {
        return content;
    }
    &content[start..end]
}

// ── HTTP client ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// [`Completion`] backed by an OpenAI-compatible chat endpoint.
#[derive(Debug, Clone)]
pub struct HttpCompletion {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
}

impl HttpCompletion {
    /// Create a client for `url`, sending `model` in every request. The API
    /// key is optional; when present it goes out as a bearer token.
    pub fn new(url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            model: model.into(),
            api_key: api_key.filter(|key| !key.is_empty()),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Override the reply length cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Check whether the endpoint is reachable (GET on the sibling /models
    /// route). Startup treats an unreachable endpoint as fatal.
    pub async fn probe(&self) -> bool {
        let base = self
            .url
            .trim_end_matches('/')
            .trim_end_matches("/chat/completions");
        let models_url = format!("{}/models", base.trim_end_matches('/'));

        let mut request = self
            .client
            .get(&models_url)
            .timeout(Duration::from_secs(5));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(url = %models_url, error = %err, "Endpoint probe failed");
                false
            }
        }
    }
}

#[async_trait]
impl Completion for HttpCompletion {
    async fn complete(
        &self,
        role: &str,
        task: &str,
        temperature: f64,
        timeout: Duration,
    ) -> CompletionResult<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: role,
                },
                ChatMessage {
                    role: "user",
                    content: task,
                },
            ],
            temperature,
            max_tokens: self.max_tokens,
        };

        let exchange = async {
            let mut call = self.client.post(&self.url).json(&request);
            if let Some(key) = &self.api_key {
                call = call.bearer_auth(key);
            }

            let response = call.send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(CompletionError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let parsed: ChatResponse = response.json().await?;
            if let Some(api_error) = parsed.error {
                return Err(CompletionError::Api(api_error.message));
            }

            parsed
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .ok_or(CompletionError::NoChoices)
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout(timeout)),
        }
    }
}
