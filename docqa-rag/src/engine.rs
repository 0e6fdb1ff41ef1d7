//! Query engine: encode → retrieve → generate → cite.
//!
//! Every query walks the same state machine:
//!
//! ```text
//! Idle → Encoding → Retrieving → NoContext                 (terminal)
//!                              → Generating → Completed    (terminal)
//!        any non-terminal state → Failed                   (terminal)
//! ```
//!
//! The generative model is only reached with a non-empty retrieved set.
//! Query-time failures are returned to the caller; nothing is degraded
//! silently.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::answer::{Answer, AnswerOutcome};
use crate::citation::{extract_citations, sanitize_response};
use crate::config::RagConfig;
use crate::document::{SearchResult, sort_results};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::GenerativeModel;
use crate::prompt::PromptBuilder;
use crate::retry::{retry, with_timeout};
use crate::textstore::TextStore;
use crate::vectorstore::VectorStore;

/// Where a query is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryState {
    Idle,
    Encoding,
    Retrieving,
    NoContext,
    Generating,
    Completed,
    Failed,
}

impl QueryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, QueryState::NoContext | QueryState::Completed | QueryState::Failed)
    }

    /// Whether `self → next` is an edge of the query state machine.
    pub fn can_transition_to(self, next: QueryState) -> bool {
        use QueryState::*;
        match (self, next) {
            (Idle, Encoding) | (Encoding, Retrieving) => true,
            (Retrieving, NoContext) | (Retrieving, Generating) => true,
            (Generating, Completed) => true,
            (Encoding | Retrieving | Generating, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryState::Idle => "idle",
            QueryState::Encoding => "encoding",
            QueryState::Retrieving => "retrieving",
            QueryState::NoContext => "no_context",
            QueryState::Generating => "generating",
            QueryState::Completed => "completed",
            QueryState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks and logs the state of one query.
#[derive(Debug)]
struct QueryTrace {
    state: QueryState,
}

impl QueryTrace {
    fn new() -> Self {
        Self { state: QueryState::Idle }
    }

    fn advance(&mut self, next: QueryState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid query transition {} -> {next}",
            self.state
        );
        debug!(query.state = %next, query.previous = %self.state, "query state changed");
        self.state = next;
    }
}

/// Answers questions from the retrieval store.
///
/// The engine holds only shared, read-only handles, so one instance can
/// serve concurrent queries.
pub struct QueryEngine {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    text_store: Arc<dyn TextStore>,
    model: Arc<dyn GenerativeModel>,
    prompt: PromptBuilder,
}

impl QueryEngine {
    pub fn new(
        config: RagConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        text_store: Arc<dyn TextStore>,
        model: Arc<dyn GenerativeModel>,
    ) -> Self {
        Self {
            config,
            embedding_provider,
            vector_store,
            text_store,
            model,
            prompt: PromptBuilder::default(),
        }
    }

    /// Use a custom prompt builder (system instructions, sampling options).
    pub fn with_prompt_builder(mut self, prompt: PromptBuilder) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Answer `question` from the chunks stored in `collection`.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidQuery`] for a blank question
    /// - [`RagError::EmbeddingError`] / [`RagError::RateLimited`] if the question cannot be encoded
    /// - [`RagError::RetrievalError`] if a store is unreachable
    /// - [`RagError::GenerationError`] if the model fails
    /// - [`RagError::Timeout`] if a provider call exceeds its deadline
    ///
    /// Finding nothing relevant is not an error: it yields
    /// [`Answer::no_context`].
    pub async fn ask(&self, collection: &str, question: &str) -> Result<Answer> {
        validate_question(question)?;

        let mut trace = QueryTrace::new();
        match self.run(collection, question, &mut trace).await {
            Ok(answer) => {
                info!(
                    collection,
                    outcome = ?answer.outcome,
                    citations = answer.citations.len(),
                    "query completed"
                );
                Ok(answer)
            }
            Err(e) => {
                error!(collection, state = %trace.state, error = %e, "query failed");
                trace.advance(QueryState::Failed);
                Err(e)
            }
        }
    }

    /// [`ask`](Self::ask) bounded by an overall deadline.
    pub async fn ask_with_timeout(
        &self,
        collection: &str,
        question: &str,
        timeout: Duration,
    ) -> Result<Answer> {
        // Expiry drops the in-flight query before it can record its own failure.
        with_timeout("query", Some(timeout), self.ask(collection, question)).await.inspect_err(|e| {
            if matches!(e, RagError::Timeout { stage, .. } if stage == "query") {
                debug!(query.state = %QueryState::Failed, "query state changed");
                error!(collection, error = %e, "query deadline exceeded");
            }
        })
    }

    /// Run only the encoding and retrieval steps.
    ///
    /// Returns at most `top_k` results, all scoring at least
    /// `similarity_threshold`, in descending score order with ties broken by
    /// chunk id. Each result carries its raw text from the text store.
    pub async fn retrieve(&self, collection: &str, question: &str) -> Result<Vec<SearchResult>> {
        validate_question(question)?;
        let embedding = self.encode(question).await?;
        self.search(collection, &embedding).await
    }

    async fn run(
        &self,
        collection: &str,
        question: &str,
        trace: &mut QueryTrace,
    ) -> Result<Answer> {
        trace.advance(QueryState::Encoding);
        let embedding = self.encode(question).await?;

        trace.advance(QueryState::Retrieving);
        let results = self.search(collection, &embedding).await?;

        if results.is_empty() {
            trace.advance(QueryState::NoContext);
            return Ok(Answer::no_context());
        }

        trace.advance(QueryState::Generating);
        let request = self.prompt.build(question, &results);
        debug!(model = self.model.name(), context_chunks = results.len(), "generating answer");
        let raw = with_timeout("generation", self.config.request_timeout(), async {
            self.model.generate(&request).await.map_err(|e| match e {
                e @ (RagError::GenerationError { .. }
                | RagError::RateLimited { .. }
                | RagError::Timeout { .. }) => e,
                other => RagError::GenerationError {
                    provider: self.model.name().to_string(),
                    message: other.to_string(),
                },
            })
        })
        .await?;

        let citations = extract_citations(&raw, &results);
        let text = sanitize_response(&raw);
        trace.advance(QueryState::Completed);

        Ok(Answer { text, citations, outcome: AnswerOutcome::Grounded })
    }

    async fn encode(&self, question: &str) -> Result<Vec<f32>> {
        let timeout = self.config.request_timeout();
        retry(&self.config.retry, "embed_query", || {
            with_timeout("embedding", timeout, self.embedding_provider.embed(question))
        })
        .await
        .map_err(|e| match e {
            RagError::ProviderRejected { provider, status, message } => RagError::EmbeddingError {
                provider,
                message: format!("rejected ({status}): {message}"),
            },
            other => other,
        })
    }

    async fn search(&self, collection: &str, embedding: &[f32]) -> Result<Vec<SearchResult>> {
        let timeout = self.config.request_timeout();
        let top_k = self.config.top_k;
        let threshold = self.config.similarity_threshold;
        let model = self.embedding_provider.model();

        let hits = with_timeout("retrieval", timeout, async {
            self.vector_store
                .search(collection, embedding, top_k)
                .await
                .map_err(|e| RagError::RetrievalError(format!("search in '{collection}' failed: {e}")))
        })
        .await?;

        let hits: Vec<SearchResult> = hits
            .into_iter()
            .filter(|hit| hit.score >= threshold)
            .filter(|hit| match hit.chunk.embedding_model() {
                Some(indexed_with) if indexed_with != model => {
                    warn!(chunk_id = %hit.chunk.id, indexed_with, model, "skipping chunk from another embedding model");
                    false
                }
                _ => true,
            })
            .collect();
        if hits.is_empty() {
            return Ok(hits);
        }

        let ids: Vec<&str> = hits.iter().map(|hit| hit.chunk.id.as_str()).collect();
        let mut texts = with_timeout("retrieval", timeout, async {
            self.text_store
                .get_many(&ids)
                .await
                .map_err(|e| RagError::RetrievalError(format!("text lookup failed: {e}")))
        })
        .await?;

        let mut results = hydrate(hits, &mut texts);
        sort_results(&mut results);
        results.truncate(top_k);
        debug!(collection, result_count = results.len(), "retrieved context");
        Ok(results)
    }
}

/// Attach raw text to each hit. Hits whose text is missing (e.g. during a
/// concurrent re-index) are dropped.
fn hydrate(
    hits: Vec<SearchResult>,
    texts: &mut HashMap<String, crate::textstore::StoredText>,
) -> Vec<SearchResult> {
    hits.into_iter()
        .filter_map(|hit| match texts.remove(&hit.chunk.id) {
            Some(stored) => {
                let mut chunk = stored.into_chunk(hit.chunk.id);
                chunk.embedding = hit.chunk.embedding;
                Some(SearchResult { chunk, score: hit.score })
            }
            None => {
                warn!(chunk_id = %hit.chunk.id, "no raw text for retrieved chunk, skipping");
                None
            }
        })
        .collect()
}

fn validate_question(question: &str) -> Result<()> {
    if question.trim().is_empty() {
        return Err(RagError::InvalidQuery("question must not be empty".to_string()));
    }
    Ok(())
}
