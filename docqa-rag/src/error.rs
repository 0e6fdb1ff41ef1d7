//! Error types for the `docqa-rag` crate.

use thiserror::Error;

/// Errors that can occur while indexing documents or answering questions.
#[derive(Debug, Error)]
pub enum RagError {
    /// The embedding provider failed or rejected the input.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A provider refused the request because of rate limiting.
    #[error("Rate limited by {provider}")]
    RateLimited {
        /// The provider that rate limited the request.
        provider: String,
        /// Delay requested by the provider (`Retry-After`), if any.
        retry_after_ms: Option<u64>,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the raw-text store backend.
    #[error("Text store error ({backend}): {message}")]
    TextStoreError {
        /// The text store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A provider rejected the request itself (a 4xx other than 408/429).
    /// Sending the same request again will fail the same way.
    #[error("Request rejected by {provider} ({status}): {message}")]
    ProviderRejected {
        /// The provider that rejected the request.
        provider: String,
        /// HTTP status returned by the provider.
        status: u16,
        /// The provider's explanation.
        message: String,
    },

    /// The retrieval step of a query failed.
    #[error("Retrieval error: {0}")]
    RetrievalError(String),

    /// The generative model failed to produce an answer.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The model provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during document chunking.
    #[error("Chunking error: {0}")]
    ChunkingError(String),

    /// Missing or invalid configuration, credentials or endpoints.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The question cannot be answered as given (e.g. it is blank).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A provider call or query step exceeded its deadline.
    #[error("Timed out during {stage} after {timeout_ms}ms")]
    Timeout {
        /// The step that timed out.
        stage: String,
        /// The deadline that was exceeded.
        timeout_ms: u64,
    },

    /// Filesystem error from a local store.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// (De)serialization error from a local store.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Whether retrying the same call may succeed.
    ///
    /// Rate limits, timeouts and provider/store transport failures are
    /// retryable. Rejected requests, configuration and query errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::RateLimited { .. }
                | RagError::Timeout { .. }
                | RagError::EmbeddingError { .. }
                | RagError::VectorStoreError { .. }
                | RagError::TextStoreError { .. }
                | RagError::GenerationError { .. }
        )
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
