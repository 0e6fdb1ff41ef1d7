//! Raw-text store trait: the chunk id → text lookup behind vector search.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::Chunk;
use crate::error::Result;

/// The raw text and metadata of one chunk, as kept by a [`TextStore`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredText {
    /// The ID of the parent document.
    pub document_id: String,
    /// Position of the chunk within its document.
    pub ordinal: usize,
    /// The chunk's raw text.
    pub text: String,
    /// Metadata inherited from the document plus chunk-specific fields.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl From<&Chunk> for StoredText {
    fn from(chunk: &Chunk) -> Self {
        Self {
            document_id: chunk.document_id.clone(),
            ordinal: chunk.ordinal,
            text: chunk.text.clone(),
            metadata: chunk.metadata.clone(),
        }
    }
}

impl StoredText {
    /// Turn the stored entry back into an (unembedded) chunk.
    pub fn into_chunk(self, id: impl Into<String>) -> Chunk {
        Chunk {
            id: id.into(),
            document_id: self.document_id,
            ordinal: self.ordinal,
            text: self.text,
            embedding: Vec::new(),
            metadata: self.metadata,
        }
    }
}

/// A key-value store holding each chunk's raw text, keyed by chunk id.
///
/// Writes to the same id overwrite the previous entry.
#[async_trait]
pub trait TextStore: Send + Sync {
    /// Store (or replace) the text of a chunk.
    async fn put(&self, id: &str, entry: StoredText) -> Result<()>;

    /// Fetch the text of a chunk, `None` if unknown.
    async fn get(&self, id: &str) -> Result<Option<StoredText>>;

    /// Fetch several chunks at once. Unknown ids are absent from the map.
    async fn get_many(&self, ids: &[&str]) -> Result<HashMap<String, StoredText>> {
        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = self.get(id).await? {
                found.insert((*id).to_string(), entry);
            }
        }
        Ok(found)
    }

    /// Remove a chunk. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// IDs of every stored chunk belonging to `document_id`, sorted.
    async fn chunk_ids_for_document(&self, document_id: &str) -> Result<Vec<String>>;
}
