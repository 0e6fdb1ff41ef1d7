//! Document indexing: chunk → embed → store.
//!
//! Indexing tolerates partial failure. Every provider call is retried under
//! the configured [`RetryPolicy`](crate::RetryPolicy); a chunk that still
//! cannot be embedded or stored is recorded in the [`IndexReport`] and the
//! remaining chunks carry on.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::chunking::Chunker;
use crate::config::RagConfig;
use crate::document::{Chunk, Document, EMBEDDING_MODEL_KEY};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::retry::{RetryPolicy, retry, with_timeout};
use crate::textstore::{StoredText, TextStore};
use crate::vectorstore::VectorStore;

/// A chunk that could not be indexed after all retries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailedChunk {
    pub chunk_id: String,
    pub document_id: String,
    /// The last error seen for this chunk.
    pub reason: String,
}

/// Outcome of an [`Indexer::index`] call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexReport {
    /// Number of documents processed.
    pub documents: usize,
    /// Chunks embedded and written to both stores.
    pub succeeded: usize,
    /// Chunks that exhausted their retries.
    pub failed: usize,
    /// Identity of every failed chunk, sorted by chunk id.
    pub failed_chunks: Vec<FailedChunk>,
    /// Chunks from an earlier version of a document that were removed.
    pub removed_stale: usize,
}

impl IndexReport {
    /// True when every chunk was indexed.
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// A chunk and either success or the reason it failed.
type ChunkOutcome = (Chunk, std::result::Result<(), String>);

/// Turns documents into embedded, stored chunks.
///
/// Raw text is written before the vector, so a search hit always has text
/// unless the process dies between the two writes. Re-indexing produces the
/// same chunk ids, which overwrite the previous entries in both stores.
pub struct Indexer {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    text_store: Arc<dyn TextStore>,
    chunker: Arc<dyn Chunker>,
}

impl Indexer {
    pub fn new(
        config: RagConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        text_store: Arc<dyn TextStore>,
        chunker: Arc<dyn Chunker>,
    ) -> Self {
        Self { config, embedding_provider, vector_store, text_store, chunker }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Index `documents` into `collection`, creating the collection if needed.
    ///
    /// A chunk that fails is also removed from both stores, so no earlier
    /// version of it stays retrievable.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if two documents share an id, and
    /// any failure to create the collection. Per-chunk failures are reported
    /// in the [`IndexReport`].
    pub async fn index(&self, collection: &str, documents: &[Document]) -> Result<IndexReport> {
        check_unique_ids(documents)?;
        self.vector_store
            .create_collection(collection, self.embedding_provider.dimensions())
            .await?;

        let mut report = IndexReport { documents: documents.len(), ..IndexReport::default() };
        let mut chunks = Vec::new();

        for document in documents {
            let document_chunks = self.chunker.chunk(document);
            report.removed_stale +=
                self.remove_stale_chunks(collection, document, &document_chunks).await;
            debug!(document.id = %document.id, chunk_count = document_chunks.len(), "chunked document");
            chunks.extend(document_chunks);
        }

        let batches: Vec<Vec<Chunk>> =
            chunks.chunks(self.config.embed_batch_size).map(<[Chunk]>::to_vec).collect();

        let outcomes: Vec<Vec<ChunkOutcome>> = stream::iter(batches)
            .map(|batch| self.index_batch(collection, batch))
            .buffer_unordered(self.config.max_concurrency)
            .collect()
            .await;

        for (chunk, outcome) in outcomes.into_iter().flatten() {
            match outcome {
                Ok(()) => report.succeeded += 1,
                Err(reason) => {
                    warn!(chunk_id = %chunk.id, document.id = %chunk.document_id, error = %reason, "chunk failed to index");
                    report.failed_chunks.push(FailedChunk {
                        chunk_id: chunk.id,
                        document_id: chunk.document_id,
                        reason,
                    });
                }
            }
        }
        report.failed = report.failed_chunks.len();
        report.failed_chunks.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        self.purge_failed(collection, &report.failed_chunks).await;

        info!(
            collection,
            documents = report.documents,
            succeeded = report.succeeded,
            failed = report.failed,
            removed_stale = report.removed_stale,
            "indexing finished"
        );
        Ok(report)
    }

    /// Remove every chunk of `document_id` from both stores.
    ///
    /// Returns the number of chunks removed.
    pub async fn delete_document(&self, collection: &str, document_id: &str) -> Result<usize> {
        remove_document(
            &self.config.retry,
            self.vector_store.as_ref(),
            self.text_store.as_ref(),
            collection,
            document_id,
        )
        .await
    }

    async fn delete_chunks(&self, collection: &str, ids: &[String]) -> Result<()> {
        delete_chunks(
            &self.config.retry,
            self.vector_store.as_ref(),
            self.text_store.as_ref(),
            collection,
            ids,
        )
        .await
    }

    /// Drop whatever an earlier run stored under the ids of failed chunks.
    async fn purge_failed(&self, collection: &str, failed: &[FailedChunk]) {
        if failed.is_empty() {
            return;
        }
        let ids: Vec<String> = failed.iter().map(|f| f.chunk_id.clone()).collect();
        match self.delete_chunks(collection, &ids).await {
            Ok(()) => debug!(count = ids.len(), "removed stored entries of failed chunks"),
            Err(e) => warn!(count = ids.len(), error = %e, "could not remove stored entries of failed chunks"),
        }
    }

    /// Delete chunks of an earlier version of `document` that the new
    /// chunking no longer produces. Failures are logged, not fatal.
    async fn remove_stale_chunks(
        &self,
        collection: &str,
        document: &Document,
        fresh: &[Chunk],
    ) -> usize {
        let existing = match retry(&self.config.retry, "text_list", || {
            self.text_store.chunk_ids_for_document(&document.id)
        })
        .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!(document.id = %document.id, error = %e, "could not list previous chunks");
                return 0;
            }
        };

        let fresh_ids: HashSet<&str> = fresh.iter().map(|c| c.id.as_str()).collect();
        let stale: Vec<String> =
            existing.into_iter().filter(|id| !fresh_ids.contains(id.as_str())).collect();
        if stale.is_empty() {
            return 0;
        }

        match self.delete_chunks(collection, &stale).await {
            Ok(()) => {
                debug!(document.id = %document.id, removed = stale.len(), "removed stale chunks");
                stale.len()
            }
            Err(e) => {
                warn!(document.id = %document.id, error = %e, "could not remove stale chunks");
                0
            }
        }
    }

    /// Embed and store one batch. A batch whose embedding call keeps failing
    /// is retried chunk by chunk so one bad input only fails itself.
    async fn index_batch(&self, collection: &str, batch: Vec<Chunk>) -> Vec<ChunkOutcome> {
        let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        let embedded = self.embed_texts(&texts).await;

        let embedded: Vec<(Chunk, Result<Vec<f32>>)> = match embedded {
            Ok(vectors) => batch.into_iter().zip(vectors.into_iter().map(Ok)).collect(),
            Err(e) if batch.len() > 1 => {
                debug!(batch_size = batch.len(), error = %e, "batch embedding failed, falling back to single chunks");
                let mut single = Vec::with_capacity(batch.len());
                for chunk in batch {
                    let vector = self
                        .embed_texts(&[chunk.text.as_str()])
                        .await
                        .map(|mut v| v.pop().unwrap_or_default());
                    single.push((chunk, vector));
                }
                single
            }
            // A single-chunk batch already had its own retries.
            Err(e) => batch.into_iter().next().map(|c| vec![(c, Err(e))]).unwrap_or_default(),
        };

        let mut outcomes = Vec::with_capacity(embedded.len());
        let mut ready = Vec::with_capacity(embedded.len());
        for (mut chunk, vector) in embedded {
            match vector.and_then(|v| self.check_dimensions(v)) {
                Ok(vector) => {
                    chunk.embedding = vector;
                    chunk.metadata.insert(
                        EMBEDDING_MODEL_KEY.to_string(),
                        self.embedding_provider.model().to_string(),
                    );
                    match self.put_text(&chunk).await {
                        Ok(()) => ready.push(chunk),
                        Err(e) => outcomes.push((chunk, Err(e.to_string()))),
                    }
                }
                Err(e) => outcomes.push((chunk, Err(e.to_string()))),
            }
        }

        outcomes.extend(self.upsert_vectors(collection, ready).await);
        outcomes
    }

    /// Embed `texts` with retries and the per-call deadline, checking that
    /// the provider returned one vector per input.
    async fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let timeout = self.config.request_timeout();
        let vectors = retry(&self.config.retry, "embed_batch", || {
            with_timeout("embedding", timeout, self.embedding_provider.embed_batch(texts))
        })
        .await?;
        if vectors.len() != texts.len() {
            return Err(RagError::EmbeddingError {
                provider: self.embedding_provider.model().to_string(),
                message: format!("expected {} embeddings, got {}", texts.len(), vectors.len()),
            });
        }
        Ok(vectors)
    }

    fn check_dimensions(&self, vector: Vec<f32>) -> Result<Vec<f32>> {
        let expected = self.embedding_provider.dimensions();
        if vector.len() != expected {
            return Err(RagError::EmbeddingError {
                provider: self.embedding_provider.model().to_string(),
                message: format!("expected {expected}-dimensional embedding, got {}", vector.len()),
            });
        }
        Ok(vector)
    }

    async fn put_text(&self, chunk: &Chunk) -> Result<()> {
        let timeout = self.config.request_timeout();
        retry(&self.config.retry, "text_put", || {
            with_timeout("text_store", timeout, self.text_store.put(&chunk.id, StoredText::from(chunk)))
        })
        .await
    }

    /// Upsert the batch in one call, falling back to one call per chunk when
    /// the batch call keeps failing.
    async fn upsert_vectors(&self, collection: &str, chunks: Vec<Chunk>) -> Vec<ChunkOutcome> {
        if chunks.is_empty() {
            return Vec::new();
        }
        match self.upsert_slice(collection, &chunks).await {
            Ok(()) => chunks.into_iter().map(|c| (c, Ok(()))).collect(),
            Err(e) if chunks.len() == 1 => {
                chunks.into_iter().map(|c| (c, Err(e.to_string()))).collect()
            }
            Err(e) => {
                debug!(batch_size = chunks.len(), error = %e, "batch upsert failed, falling back to single chunks");
                let mut outcomes = Vec::with_capacity(chunks.len());
                for chunk in chunks {
                    let result = self
                        .upsert_slice(collection, std::slice::from_ref(&chunk))
                        .await
                        .map_err(|e| e.to_string());
                    outcomes.push((chunk, result));
                }
                outcomes
            }
        }
    }

    async fn upsert_slice(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        let timeout = self.config.request_timeout();
        retry(&self.config.retry, "vector_upsert", || {
            with_timeout("vector_store", timeout, self.vector_store.upsert(collection, chunks))
        })
        .await
    }
}

/// Remove every chunk of `document_id` from both stores without needing an
/// embedding provider. Returns the number of chunks removed.
pub async fn remove_document(
    policy: &RetryPolicy,
    vector_store: &dyn VectorStore,
    text_store: &dyn TextStore,
    collection: &str,
    document_id: &str,
) -> Result<usize> {
    let ids = retry(policy, "text_list", || text_store.chunk_ids_for_document(document_id)).await?;
    delete_chunks(policy, vector_store, text_store, collection, &ids).await?;
    info!(collection, document.id = document_id, removed = ids.len(), "deleted document");
    Ok(ids.len())
}

async fn delete_chunks(
    policy: &RetryPolicy,
    vector_store: &dyn VectorStore,
    text_store: &dyn TextStore,
    collection: &str,
    ids: &[String],
) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    retry(policy, "vector_delete", || vector_store.delete(collection, &refs)).await?;
    for id in ids {
        retry(policy, "text_delete", || text_store.delete(id)).await?;
    }
    Ok(())
}

/// Chunk ids derive from document ids, so two documents with one id would
/// overwrite each other's chunks.
fn check_unique_ids(documents: &[Document]) -> Result<()> {
    let mut seen = HashSet::with_capacity(documents.len());
    for document in documents {
        if !seen.insert(document.id.as_str()) {
            return Err(RagError::ConfigError(format!(
                "document id '{}' appears more than once in one indexing call",
                document.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_document_ids_are_rejected() {
        let documents = [Document::new("guide", "a"), Document::new("bas", "b"), Document::new("guide", "c")];
        let err = check_unique_ids(&documents).unwrap_err();
        assert!(matches!(err, RagError::ConfigError(ref m) if m.contains("'guide'")));
        assert!(check_unique_ids(&documents[..2]).is_ok());
    }
}
