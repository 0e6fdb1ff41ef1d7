//! In-memory stores.
//!
//! [`InMemoryVectorStore`] is a zero-dependency vector store backed by a
//! `HashMap` protected by a `tokio::sync::RwLock`, with brute-force cosine
//! similarity search. It can be snapshotted to a JSON file so a local index
//! survives between runs. [`InMemoryTextStore`] is the matching raw-text store.
//! Both are suitable for development, testing, and small corpora.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{Chunk, SearchResult, sort_results};
use crate::error::{RagError, Result};
use crate::textstore::{StoredText, TextStore};
use crate::vectorstore::VectorStore;

const BACKEND: &str = "InMemory";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Collection {
    dimensions: usize,
    chunks: HashMap<String, Chunk>,
}

/// An in-memory vector store using cosine similarity for search.
///
/// Collections are stored as nested `HashMap`s: collection name → chunk ID → chunk.
/// Every collection has a fixed dimensionality; upserting or searching with a
/// vector of another size is an error, so embeddings of different models
/// cannot be mixed in one collection.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 1536).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot written by [`save`](Self::save). A missing file yields
    /// an empty store.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let collections = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "loaded vector snapshot");
        Ok(Self { collections: RwLock::new(collections) })
    }

    /// Write every collection to `path` as JSON, replacing the file atomically.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = {
            let collections = self.collections.read().await;
            serde_json::to_vec(&*collections)?
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), "saved vector snapshot");
        Ok(())
    }

    /// Number of chunks stored in a collection, `None` if it does not exist.
    pub async fn len(&self, collection: &str) -> Option<usize> {
        self.collections.read().await.get(collection).map(|c| c.chunks.len())
    }

    /// Stored vectors of a collection keyed by chunk id, `None` if it does not exist.
    pub async fn embeddings(&self, collection: &str) -> Option<BTreeMap<String, Vec<f32>>> {
        self.collections.read().await.get(collection).map(|c| {
            c.chunks.iter().map(|(id, chunk)| (id.clone(), chunk.embedding.clone())).collect()
        })
    }

    fn missing(collection: &str) -> RagError {
        RagError::VectorStoreError {
            backend: BACKEND.to_string(),
            message: format!("collection '{collection}' does not exist"),
        }
    }

    fn dimension_mismatch(collection: &str, expected: usize, actual: usize) -> RagError {
        RagError::VectorStoreError {
            backend: BACKEND.to_string(),
            message: format!(
                "collection '{collection}' holds {expected}-dimensional vectors, got {actual}"
            ),
        }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(name.to_string())
            .or_insert_with(|| Collection { dimensions, chunks: HashMap::new() });
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| Self::missing(collection))?;
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != store.dimensions) {
            return Err(Self::dimension_mismatch(collection, store.dimensions, bad.embedding.len()));
        }
        for chunk in chunks {
            store.chunks.insert(chunk.id.clone(), chunk.clone());
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let Some(store) = collections.get_mut(collection) else {
            return Ok(());
        };
        for id in ids {
            store.chunks.remove(*id);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        // Nothing indexed yet.
        let Some(store) = collections.get(collection) else {
            debug!(collection, "search in missing collection");
            return Ok(Vec::new());
        };
        if embedding.len() != store.dimensions {
            return Err(Self::dimension_mismatch(collection, store.dimensions, embedding.len()));
        }

        let mut scored: Vec<SearchResult> = store
            .chunks
            .values()
            .map(|chunk| {
                let score = cosine_similarity(&chunk.embedding, embedding);
                SearchResult { chunk: chunk.clone(), score }
            })
            .collect();

        sort_results(&mut scored);
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// An in-memory [`TextStore`].
///
/// Entries are kept in a `BTreeMap`, so per-document listings come back sorted.
#[derive(Debug, Default)]
pub struct InMemoryTextStore {
    entries: RwLock<BTreeMap<String, StoredText>>,
}

impl InMemoryTextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl TextStore for InMemoryTextStore {
    async fn put(&self, id: &str, entry: StoredText) -> Result<()> {
        self.entries.write().await.insert(id.to_string(), entry);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<StoredText>> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(id).is_some())
    }

    async fn chunk_ids_for_document(&self, document_id: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.document_id == document_id)
            .map(|(id, _)| id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: "doc".to_string(),
            ordinal: 0,
            text: format!("text of {id}"),
            embedding,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn upsert_requires_existing_collection() {
        let store = InMemoryVectorStore::new();
        let err = store.upsert("missing", &[chunk("a", vec![1.0])]).await.unwrap_err();
        assert!(matches!(err, RagError::VectorStoreError { .. }));
    }

    #[tokio::test]
    async fn search_in_missing_collection_is_empty() {
        let store = InMemoryVectorStore::new();
        assert!(store.search("missing", &[1.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_vectors_of_another_dimension() {
        let store = InMemoryVectorStore::new();
        store.create_collection("docs", 2).await.unwrap();
        assert!(store.upsert("docs", &[chunk("a", vec![1.0, 0.0, 0.0])]).await.is_err());
        assert!(store.search("docs", &[1.0], 3).await.is_err());
    }

    #[tokio::test]
    async fn equal_scores_come_back_in_id_order() {
        let store = InMemoryVectorStore::new();
        store.create_collection("docs", 2).await.unwrap();
        store
            .upsert(
                "docs",
                &[chunk("c", vec![1.0, 0.0]), chunk("a", vec![1.0, 0.0]), chunk("b", vec![0.0, 1.0])],
            )
            .await
            .unwrap();
        let results = store.search("docs", &[1.0, 0.0], 3).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, ["a", "c", "b"]);
    }

    #[tokio::test]
    async fn upsert_overwrites_same_id() {
        let store = InMemoryVectorStore::new();
        store.create_collection("docs", 2).await.unwrap();
        store.upsert("docs", &[chunk("a", vec![1.0, 0.0])]).await.unwrap();
        store.upsert("docs", &[chunk("a", vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(store.len("docs").await, Some(1));
        let results = store.search("docs", &[0.0, 1.0], 1).await.unwrap();
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn snapshot_round_trip_preserves_search() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.json");

        let store = InMemoryVectorStore::new();
        store.create_collection("docs", 2).await.unwrap();
        store.upsert("docs", &[chunk("a", vec![1.0, 0.0]), chunk("b", vec![0.0, 1.0])]).await.unwrap();
        store.save(&path).await.unwrap();

        let restored = InMemoryVectorStore::load(&path).await.unwrap();
        let results = restored.search("docs", &[0.0, 1.0], 1).await.unwrap();
        assert_eq!(results[0].chunk.id, "b");
    }

    #[tokio::test]
    async fn loading_missing_snapshot_gives_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryVectorStore::load(dir.path().join("none.json")).await.unwrap();
        assert_eq!(store.len("docs").await, None);
    }

    #[tokio::test]
    async fn text_store_lists_chunks_by_document() {
        let store = InMemoryTextStore::new();
        for (id, doc) in [("d1_1", "d1"), ("d2_0", "d2"), ("d1_0", "d1")] {
            let entry = StoredText {
                document_id: doc.to_string(),
                ordinal: 0,
                text: id.to_string(),
                metadata: HashMap::new(),
            };
            store.put(id, entry).await.unwrap();
        }
        assert_eq!(store.chunk_ids_for_document("d1").await.unwrap(), ["d1_0", "d1_1"]);
        assert!(store.delete("d1_0").await.unwrap());
        assert!(!store.delete("d1_0").await.unwrap());
        assert_eq!(store.get("d1_0").await.unwrap(), None);
        let many = store.get_many(&["d1_1", "nope"]).await.unwrap();
        assert_eq!(many.len(), 1);
    }
}
