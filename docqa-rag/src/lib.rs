//! # docqa-rag
//!
//! Grounded question answering over a document collection.
//!
//! ## Overview
//!
//! Documents are split into overlapping chunks, embedded and written to two
//! stores: a [`VectorStore`] holding embeddings and a [`TextStore`] holding
//! the raw chunk text. A question is embedded, the most similar chunks are
//! retrieved, and a [`GenerativeModel`] answers from those chunks only. Every
//! answer carries [`Citation`]s back to the chunks it used; when nothing
//! relevant is retrieved the model is never called.
//!
//! - [`Indexer`] - chunk → embed → store, with retries and a per-chunk report
//! - [`QueryEngine`] - encode → retrieve → generate → cite
//! - [`RagPipeline`] - both, wired to one set of providers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docqa_rag::{Document, InMemoryTextStore, InMemoryVectorStore, RagPipeline};
//! use docqa_rag::openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
//!
//! let pipeline = RagPipeline::builder()
//!     .embedding_provider(Arc::new(OpenAIEmbeddingProvider::from_env()?))
//!     .generative_model(Arc::new(OpenAIChatModel::from_env()?))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .text_store(Arc::new(InMemoryTextStore::new()))
//!     .build()?;
//!
//! let guide = Document::new("ato-gst-guide", text).with_title("ATO GST Guide");
//! pipeline.index("documents", &[guide]).await?;
//! let answer = pipeline.ask("documents", "What is the GST threshold?").await?;
//! ```
//!
//! ## Features
//!
//! | Feature | Provides |
//! |---------|----------|
//! | `openai` | [`openai::OpenAIEmbeddingProvider`], [`openai::OpenAIChatModel`] |
//! | `qdrant` | [`qdrant::QdrantVectorStore`] |

pub mod answer;
pub mod chunking;
pub mod citation;
pub mod config;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod filestore;
pub mod generation;
pub mod indexer;
pub mod inmemory;
pub mod pipeline;
pub mod prompt;
pub mod retry;
pub mod textstore;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use answer::{Answer, AnswerOutcome, Citation, NO_GROUNDED_ANSWER};
pub use chunking::{Chunker, FixedSizeChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, SearchResult};
pub use embedding::EmbeddingProvider;
pub use engine::{QueryEngine, QueryState};
pub use error::{RagError, Result};
pub use filestore::FileTextStore;
pub use generation::{GenerationOptions, GenerationRequest, GenerativeModel};
pub use indexer::{FailedChunk, IndexReport, Indexer};
pub use inmemory::{InMemoryTextStore, InMemoryVectorStore};
pub use pipeline::{RagPipeline, RagPipelineBuilder};
pub use prompt::PromptBuilder;
pub use retry::RetryPolicy;
pub use textstore::{StoredText, TextStore};
pub use vectorstore::VectorStore;
