//! Generative model trait used to turn retrieved context into an answer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Sampling options passed to the model with every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationOptions {
    /// Sampling temperature. Low values keep answers close to the context.
    pub temperature: f32,
    /// Upper bound on generated tokens, provider default when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self { temperature: 0.1, max_tokens: None }
    }
}

/// A single, non-streaming generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Instructions given to the model as the system message.
    pub system: String,
    /// The user message: retrieved context followed by the question.
    pub prompt: String,
    pub options: GenerationOptions,
}

/// A text generation backend.
///
/// The query engine only calls [`generate`](GenerativeModel::generate) when
/// retrieval produced at least one chunk of context.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Produce the model's full reply to `request`.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Name of the model, for logging.
    fn name(&self) -> &str;
}
