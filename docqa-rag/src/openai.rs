//! OpenAI embedding and chat-completion providers.
//!
//! This module is only available when the `openai` feature is enabled. Any
//! OpenAI-compatible server can be used by overriding the base URL.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{GenerationRequest, GenerativeModel};

const PROVIDER: &str = "OpenAI";

/// The default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// The default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Dimensionality of `text-embedding-ada-002`.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;

/// The default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings shared by both providers.
#[derive(Debug, Clone)]
struct Endpoint {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl Endpoint {
    fn new(api_key: String, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(RagError::ConfigError("OpenAI API key must not be empty".into()));
        }
        Ok(Self { client: build_client(timeout)?, api_key, base_url: DEFAULT_BASE_URL.into() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    /// POST `body` to `path` and decode the JSON reply. `wrap` turns a
    /// transport or API failure message into the caller's error variant.
    async fn post<B, R>(&self, path: &str, body: &B, wrap: fn(String) -> RagError) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, path, error = %e, "request failed");
                wrap(format!("request failed: {e}"))
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            debug!(provider = PROVIDER, path, ?retry_after_ms, "rate limited");
            return Err(RagError::RateLimited { provider: PROVIDER.into(), retry_after_ms });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            error!(provider = PROVIDER, path, %status, "API error");
            return Err(status_error(status, detail, wrap));
        }

        response.json().await.map_err(|e| {
            error!(provider = PROVIDER, path, error = %e, "failed to parse response");
            wrap(format!("failed to parse response: {e}"))
        })
    }
}

/// Map a non-success status other than 429. Bad credentials are a
/// configuration problem; other client errors are permanent rejections.
/// 408 and server errors stay in the caller's (retryable) variant.
fn status_error(status: StatusCode, detail: String, wrap: fn(String) -> RagError) -> RagError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RagError::ConfigError(format!("{PROVIDER} rejected the API key ({status}): {detail}"))
        }
        StatusCode::REQUEST_TIMEOUT => wrap(format!("API returned {status}: {detail}")),
        s if s.is_client_error() => RagError::ProviderRejected {
            provider: PROVIDER.into(),
            status: s.as_u16(),
            message: detail,
        },
        _ => wrap(format!("API returned {status}: {detail}")),
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RagError::ConfigError(format!("failed to build HTTP client: {e}")))
}

/// `Retry-After` in delta-seconds. HTTP dates are ignored.
fn parse_retry_after(value: &str) -> Option<u64> {
    let seconds: f64 = value.trim().parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| (seconds * 1000.0) as u64)
}

fn api_key_from_env() -> Result<String> {
    std::env::var("OPENAI_API_KEY")
        .map_err(|_| RagError::ConfigError("OPENAI_API_KEY environment variable not set".into()))
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── Embeddings ─────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by the `/embeddings` endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?;
/// let embedding = provider.embed("What is the GST threshold?").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    endpoint: Endpoint,
    model: String,
    dimensions: usize,
}

impl OpenAIEmbeddingProvider {
    /// Create a provider for `text-embedding-ada-002`.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(api_key.into(), DEFAULT_TIMEOUT)?,
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        })
    }

    /// Create a provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env()?)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.endpoint.base_url = base_url.into();
        self
    }

    /// Set the model and the dimensionality it produces.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }

    /// Per-request HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.endpoint.client = build_client(timeout)?;
        Ok(self)
    }

    fn embedding_error(message: String) -> RagError {
        RagError::EmbeddingError { provider: PROVIDER.into(), message }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| Self::embedding_error("API returned empty response".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let request = EmbeddingRequest { model: &self.model, input: texts };
        let mut response: EmbeddingResponse =
            self.endpoint.post("embeddings", &request, Self::embedding_error).await?;

        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ── Chat completions ───────────────────────────────────────────────

/// A [`GenerativeModel`] backed by the `/chat/completions` endpoint.
pub struct OpenAIChatModel {
    endpoint: Endpoint,
    model: String,
}

impl OpenAIChatModel {
    /// Create a model client for `gpt-4o-mini`.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(api_key.into(), DEFAULT_TIMEOUT)?,
            model: DEFAULT_CHAT_MODEL.into(),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env()?)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.endpoint.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.endpoint.client = build_client(timeout)?;
        Ok(self)
    }

    fn generation_error(message: String) -> RagError {
        RagError::GenerationError { provider: PROVIDER.into(), message }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl GenerativeModel for OpenAIChatModel {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        debug!(provider = PROVIDER, model = %self.model, prompt_len = request.prompt.len(), "chat completion");

        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.prompt },
            ],
            temperature: request.options.temperature,
            max_tokens: request.options.max_tokens,
        };
        let response: ChatResponse =
            self.endpoint.post("chat/completions", &body, Self::generation_error).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| Self::generation_error("API returned no content".into()))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_seconds_are_converted() {
        assert_eq!(parse_retry_after("2"), Some(2000));
        assert_eq!(parse_retry_after(" 0.5 "), Some(500));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after("-1"), None);
    }

    #[test]
    fn client_errors_are_not_retried() {
        let wrap = OpenAIEmbeddingProvider::embedding_error;
        let rejected = status_error(StatusCode::BAD_REQUEST, "maximum context length exceeded".into(), wrap);
        assert!(matches!(rejected, RagError::ProviderRejected { status: 400, .. }));
        assert!(!rejected.is_retryable());

        let auth = status_error(StatusCode::UNAUTHORIZED, "invalid api key".into(), wrap);
        assert!(matches!(auth, RagError::ConfigError(_)));

        assert!(status_error(StatusCode::REQUEST_TIMEOUT, String::new(), wrap).is_retryable());
        assert!(status_error(StatusCode::BAD_GATEWAY, String::new(), wrap).is_retryable());
    }

    #[test]
    fn empty_api_key_is_a_config_error() {
        assert!(matches!(OpenAIEmbeddingProvider::new(""), Err(RagError::ConfigError(_))));
        assert!(matches!(OpenAIChatModel::new("  "), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn base_url_joins_paths() {
        let provider =
            OpenAIEmbeddingProvider::new("sk-test").unwrap().with_base_url("http://localhost:8080/v1/");
        assert_eq!(provider.endpoint.url("embeddings"), "http://localhost:8080/v1/embeddings");
        assert_eq!(provider.model(), DEFAULT_EMBEDDING_MODEL);
        assert_eq!(provider.dimensions(), 1536);
    }
}
