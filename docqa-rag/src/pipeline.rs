//! Pipeline facade.
//!
//! The [`RagPipeline`] wires one set of providers into an [`Indexer`] and a
//! [`QueryEngine`] that share them.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{InMemoryTextStore, InMemoryVectorStore, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .text_store(Arc::new(InMemoryTextStore::new()))
//!     .generative_model(Arc::new(my_model))
//!     .build()?;
//!
//! let report = pipeline.index("docs", &documents).await?;
//! let answer = pipeline.ask("docs", "What is the GST threshold?").await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::answer::Answer;
use crate::chunking::{Chunker, FixedSizeChunker};
use crate::config::RagConfig;
use crate::document::{Document, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::engine::QueryEngine;
use crate::error::{RagError, Result};
use crate::generation::GenerativeModel;
use crate::indexer::{IndexReport, Indexer};
use crate::prompt::PromptBuilder;
use crate::textstore::TextStore;
use crate::vectorstore::VectorStore;

/// Indexing and question answering over one set of stores.
///
/// Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    indexer: Indexer,
    engine: QueryEngine,
}

impl RagPipeline {
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    pub fn config(&self) -> &RagConfig {
        self.indexer.config()
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// Create a collection sized for the configured embedding provider.
    pub async fn create_collection(&self, name: &str) -> Result<()> {
        let dimensions = self.embedding_provider.dimensions();
        self.vector_store.create_collection(name, dimensions).await.inspect_err(|e| {
            error!(collection = name, error = %e, "failed to create collection");
        })
    }

    /// Delete a collection and every vector in it.
    ///
    /// Raw text is not removed; use [`delete_document`](Self::delete_document)
    /// for a full per-document removal.
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        self.vector_store.delete_collection(name).await.inspect_err(|e| {
            error!(collection = name, error = %e, "failed to delete collection");
        })?;
        info!(collection = name, "deleted collection");
        Ok(())
    }

    /// See [`Indexer::index`].
    pub async fn index(&self, collection: &str, documents: &[Document]) -> Result<IndexReport> {
        self.indexer.index(collection, documents).await
    }

    /// See [`Indexer::delete_document`].
    pub async fn delete_document(&self, collection: &str, document_id: &str) -> Result<usize> {
        self.indexer.delete_document(collection, document_id).await
    }

    /// See [`QueryEngine::retrieve`].
    pub async fn retrieve(&self, collection: &str, question: &str) -> Result<Vec<SearchResult>> {
        self.engine.retrieve(collection, question).await
    }

    /// See [`QueryEngine::ask`].
    pub async fn ask(&self, collection: &str, question: &str) -> Result<Answer> {
        self.engine.ask(collection, question).await
    }

    /// See [`QueryEngine::ask_with_timeout`].
    pub async fn ask_with_timeout(
        &self,
        collection: &str,
        question: &str,
        timeout: Duration,
    ) -> Result<Answer> {
        self.engine.ask_with_timeout(collection, question, timeout).await
    }
}

/// Builder for a [`RagPipeline`].
///
/// The embedding provider, both stores and the generative model are
/// required. Without a chunker, a [`FixedSizeChunker`] sized from the config
/// is used.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    text_store: Option<Arc<dyn TextStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    generative_model: Option<Arc<dyn GenerativeModel>>,
    prompt_builder: Option<PromptBuilder>,
}

impl RagPipelineBuilder {
    /// Defaults to [`RagConfig::default()`].
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    pub fn text_store(mut self, store: Arc<dyn TextStore>) -> Self {
        self.text_store = Some(store);
        self
    }

    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    pub fn generative_model(mut self, model: Arc<dyn GenerativeModel>) -> Self {
        self.generative_model = Some(model);
        self
    }

    pub fn prompt_builder(mut self, prompt_builder: PromptBuilder) -> Self {
        self.prompt_builder = Some(prompt_builder);
        self
    }

    /// Validate the configuration and assemble the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required component is missing
    /// or the config is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let text_store = self
            .text_store
            .ok_or_else(|| RagError::ConfigError("text_store is required".to_string()))?;
        let generative_model = self
            .generative_model
            .ok_or_else(|| RagError::ConfigError("generative_model is required".to_string()))?;
        let chunker = self.chunker.unwrap_or_else(|| {
            Arc::new(FixedSizeChunker::new(config.chunk_size, config.chunk_overlap))
        });

        let indexer = Indexer::new(
            config.clone(),
            embedding_provider.clone(),
            vector_store.clone(),
            text_store.clone(),
            chunker,
        );
        let mut engine = QueryEngine::new(
            config,
            embedding_provider.clone(),
            vector_store.clone(),
            text_store,
            generative_model,
        );
        if let Some(prompt_builder) = self.prompt_builder {
            engine = engine.with_prompt_builder(prompt_builder);
        }

        Ok(RagPipeline { embedding_provider, vector_store, indexer, engine })
    }
}
