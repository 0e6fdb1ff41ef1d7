//! Data types for documents, chunks, and search results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata key holding a document's human-readable title.
pub const TITLE_KEY: &str = "title";
/// Metadata key holding a document's page number.
pub const PAGE_KEY: &str = "page";
/// Metadata key holding a chunk's ordinal position within its document.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";
/// Metadata key holding the source URI inherited from the document.
pub const SOURCE_URI_KEY: &str = "source_uri";
/// Metadata key holding the id of the model that embedded a chunk.
pub const EMBEDDING_MODEL_KEY: &str = "embedding_model";

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Optional URI pointing to the original source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: HashMap::new(), source_uri: None }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.insert(TITLE_KEY.to_string(), title.into());
        self
    }

    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.metadata.insert(PAGE_KEY.to_string(), page.to_string());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.get(TITLE_KEY).map(String::as_str)
    }

    pub fn page(&self) -> Option<u32> {
        self.metadata.get(PAGE_KEY).and_then(|p| p.parse().ok())
    }
}

/// A contiguous slice of a [`Document`]'s text, the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk, `{document_id}_{ordinal}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Position of the chunk within its document, starting at 0.
    pub ordinal: usize,
    /// The text content of the chunk.
    pub text: String,
    /// The vector embedding for this chunk's text. Empty until embedded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    /// Key-value metadata inherited from the parent document plus chunk-specific fields.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// The id a chunk at `ordinal` of `document_id` always receives.
    pub fn id_for(document_id: &str, ordinal: usize) -> String {
        format!("{document_id}_{ordinal}")
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.get(TITLE_KEY).map(String::as_str)
    }

    pub fn source_uri(&self) -> Option<&str> {
        self.metadata.get(SOURCE_URI_KEY).map(String::as_str)
    }

    pub fn embedding_model(&self) -> Option<&str> {
        self.metadata.get(EMBEDDING_MODEL_KEY).map(String::as_str)
    }
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// Order results by descending score, breaking ties by ascending chunk id.
pub fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk: Chunk {
                id: id.to_string(),
                document_id: "d".to_string(),
                ordinal: 0,
                text: String::new(),
                embedding: Vec::new(),
                metadata: HashMap::new(),
            },
            score,
        }
    }

    #[test]
    fn ties_are_broken_by_chunk_id() {
        let mut results = vec![result("b", 0.5), result("c", 0.9), result("a", 0.5)];
        sort_results(&mut results);
        let ids: Vec<_> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn document_builders_fill_metadata() {
        let doc = Document::new("gst", "text")
            .with_title("GST Guide")
            .with_page(4)
            .with_source_uri("https://example.org/gst");
        assert_eq!(doc.title(), Some("GST Guide"));
        assert_eq!(doc.page(), Some(4));
        assert_eq!(doc.source_uri.as_deref(), Some("https://example.org/gst"));
    }
}
