//! Document chunking.
//!
//! The [`Chunker`] trait turns a [`Document`] into retrievable [`Chunk`]s.
//! [`FixedSizeChunker`] is deterministic in `(text, chunk_size, chunk_overlap)`,
//! which is what makes re-indexing idempotent: the same document always
//! yields the same chunk ids and boundaries.

use crate::document::{CHUNK_INDEX_KEY, Chunk, Document, SOURCE_URI_KEY};

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata but no embeddings.
/// Embeddings are attached later by the indexer.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    /// Each returned chunk has an empty embedding vector.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text into fixed-size windows of characters with a fixed overlap.
///
/// Windows are measured in `char`s, never bytes, so multi-byte text is never
/// cut inside a code point. Each window starts `chunk_size - chunk_overlap`
/// characters after the previous one; splitting stops as soon as a window
/// reaches the end of the text, so the final chunk may be shorter.
///
/// Chunk IDs are generated as `{document_id}_{ordinal}`. Each chunk inherits
/// the parent document's metadata plus `chunk_index` and `source_uri`.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(500, 50);
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// An overlap that is not smaller than `chunk_size` is clamped to
    /// `chunk_size - 1` so that every window advances; configuration
    /// validation rejects such values before they reach the chunker.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` — maximum number of characters per chunk
    /// * `chunk_overlap` — number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self { chunk_size, chunk_overlap: chunk_overlap.min(chunk_size - 1) }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Byte ranges of each window over `text`.
    fn windows(&self, text: &str) -> Vec<(usize, usize)> {
        // Byte offset of every char boundary, including the end of the text.
        let boundaries: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
        let char_count = boundaries.len() - 1;
        let step = self.chunk_size - self.chunk_overlap;

        let mut windows = Vec::new();
        let mut start = 0;
        while start < char_count {
            let end = (start + self.chunk_size).min(char_count);
            windows.push((boundaries[start], boundaries[end]));
            if end == char_count {
                break;
            }
            start += step;
        }
        windows
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.is_empty() {
            return Vec::new();
        }

        self.windows(&document.text)
            .into_iter()
            .enumerate()
            .map(|(ordinal, (start, end))| {
                let mut metadata = document.metadata.clone();
                metadata.insert(CHUNK_INDEX_KEY.to_string(), ordinal.to_string());
                if let Some(uri) = &document.source_uri {
                    metadata.insert(SOURCE_URI_KEY.to_string(), uri.clone());
                }
                Chunk {
                    id: Chunk::id_for(&document.id, ordinal),
                    document_id: document.id.clone(),
                    ordinal,
                    text: document.text[start..end].to_string(),
                    embedding: Vec::new(),
                    metadata,
                }
            })
            .collect()
    }
}

/// Rebuild a document's text from its chunks.
///
/// Chunks are ordered by ordinal and the leading `overlap` characters of every
/// chunk after the first are dropped.
pub fn reconstruct(chunks: &[Chunk], overlap: usize) -> String {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.ordinal);

    let mut text = String::new();
    for (i, chunk) in ordered.into_iter().enumerate() {
        if i == 0 {
            text.push_str(&chunk.text);
        } else {
            text.extend(chunk.text.chars().skip(overlap));
        }
    }
    text
}
