//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! Qdrant only accepts UUID or integer point ids, so each chunk id is mapped
//! to a deterministic UUIDv5 and the chunk id itself travels in the payload.
//! Raw text is not stored here; it lives in the [`TextStore`](crate::TextStore).
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::qdrant::QdrantVectorStore;
//!
//! let store = QdrantVectorStore::new("http://localhost:6334")?;
//! store.create_collection("documents", 1536).await?;
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, DeletePointsBuilder, Distance, PointId, PointStruct, PointsIdsList,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::document::{Chunk, SearchResult, sort_results};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const CHUNK_ID: &str = "chunk_id";
const DOCUMENT_ID: &str = "document_id";
const ORDINAL: &str = "ordinal";
const METADATA: &str = "metadata";

/// Deterministic Qdrant point id for a chunk id.
pub fn point_id(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
}

/// A [`VectorStore`] backed by [Qdrant](https://qdrant.tech/) with cosine distance.
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    /// Connect to the Qdrant gRPC endpoint at `url`.
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Ok(Self { client })
    }

    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    fn map_err(e: qdrant_client::QdrantError) -> RagError {
        RagError::VectorStoreError { backend: "qdrant".to_string(), message: e.to_string() }
    }

    fn payload_for(chunk: &Chunk) -> Result<Payload> {
        let value = json!({
            CHUNK_ID: chunk.id,
            DOCUMENT_ID: chunk.document_id,
            ORDINAL: chunk.ordinal,
            METADATA: chunk.metadata,
        });
        Payload::try_from(value).map_err(Self::map_err)
    }

    fn string_field(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<String> {
        match payload.get(key).and_then(|v| v.kind.as_ref()) {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn chunk_from_payload(payload: HashMap<String, QdrantValue>) -> Option<Chunk> {
        let id = Self::string_field(&payload, CHUNK_ID)?;
        let document_id = Self::string_field(&payload, DOCUMENT_ID).unwrap_or_default();
        let ordinal = match payload.get(ORDINAL).and_then(|v| v.kind.as_ref()) {
            Some(Kind::IntegerValue(n)) => usize::try_from(*n).unwrap_or_default(),
            Some(Kind::DoubleValue(n)) => *n as usize,
            _ => 0,
        };
        let metadata = match payload.get(METADATA).and_then(|v| v.kind.as_ref()) {
            Some(Kind::StructValue(s)) => s
                .fields
                .iter()
                .filter_map(|(k, v)| match &v.kind {
                    Some(Kind::StringValue(s)) => Some((k.clone(), s.clone())),
                    _ => None,
                })
                .collect(),
            _ => HashMap::new(),
        };
        Some(Chunk { id, document_id, ordinal, text: String::new(), embedding: Vec::new(), metadata })
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let collections = self.client.list_collections().await.map_err(Self::map_err)?;
        if collections.collections.iter().any(|c| c.name == name) {
            debug!(collection = name, "qdrant collection already exists, skipping creation");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dimensions as u64, Distance::Cosine)),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = name, dimensions, "created qdrant collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.client.delete_collection(name).await.map_err(Self::map_err)?;
        debug!(collection = name, "deleted qdrant collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let points = chunks
            .iter()
            .map(|chunk| {
                Ok(PointStruct::new(
                    point_id(&chunk.id),
                    chunk.embedding.clone(),
                    Self::payload_for(chunk)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection, count = chunks.len(), "upserted chunks to qdrant");
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let point_ids: Vec<PointId> = ids.iter().map(|id| PointId::from(point_id(id))).collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(PointsIdsList { ids: point_ids })
                    .wait(true),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection, count = ids.len(), "deleted points from qdrant");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, embedding.to_vec(), top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(Self::map_err)?;

        let mut results: Vec<SearchResult> = response
            .result
            .into_iter()
            .filter_map(|scored| {
                let score = scored.score;
                Self::chunk_from_payload(scored.payload).map(|chunk| SearchResult { chunk, score })
            })
            .collect();
        sort_results(&mut results);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_stable_uuids() {
        let id = point_id("ato-gst-guide_0");
        assert_eq!(id, point_id("ato-gst-guide_0"));
        assert_ne!(id, point_id("ato-gst-guide_1"));
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn payload_round_trips_chunk_identity() {
        let chunk = Chunk {
            id: "gst_3".into(),
            document_id: "gst".into(),
            ordinal: 3,
            text: "ignored".into(),
            embedding: vec![0.1, 0.2],
            metadata: HashMap::from([("title".to_string(), "GST Guide".to_string())]),
        };
        let payload: HashMap<String, QdrantValue> =
            QdrantVectorStore::payload_for(&chunk).unwrap().into();
        let restored = QdrantVectorStore::chunk_from_payload(payload).unwrap();
        assert_eq!(restored.id, "gst_3");
        assert_eq!(restored.document_id, "gst");
        assert_eq!(restored.ordinal, 3);
        assert_eq!(restored.title(), Some("GST Guide"));
        assert!(restored.text.is_empty());
    }
}
