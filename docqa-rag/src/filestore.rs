//! Filesystem-backed raw-text store.
//!
//! [`FileTextStore`] keeps one JSON file per chunk under a root directory.
//! Writes go through a temporary file and a rename, so a reader never sees
//! a half-written entry and re-indexing a chunk overwrites it cleanly.
//!
//! The chunk ids of each document are indexed in memory when the store is
//! opened, so listing a document's chunks does not touch the disk.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{RagError, Result};
use crate::textstore::{StoredText, TextStore};

const BACKEND: &str = "File";
const EXTENSION: &str = "json";

/// Chunk ids grouped by owning document.
#[derive(Debug, Default)]
struct DocumentIndex {
    by_document: HashMap<String, BTreeSet<String>>,
    owner: HashMap<String, String>,
}

impl DocumentIndex {
    fn insert(&mut self, chunk_id: &str, document_id: &str) {
        self.remove(chunk_id);
        self.owner.insert(chunk_id.to_string(), document_id.to_string());
        self.by_document.entry(document_id.to_string()).or_default().insert(chunk_id.to_string());
    }

    fn remove(&mut self, chunk_id: &str) {
        let Some(document_id) = self.owner.remove(chunk_id) else {
            return;
        };
        if let Some(ids) = self.by_document.get_mut(&document_id) {
            ids.remove(chunk_id);
            if ids.is_empty() {
                self.by_document.remove(&document_id);
            }
        }
    }
}

/// A [`TextStore`] that persists each chunk as `<root>/<escaped id>.json`.
#[derive(Debug, Clone)]
pub struct FileTextStore {
    root: PathBuf,
    index: Arc<RwLock<DocumentIndex>>,
}

impl FileTextStore {
    /// Open (and create if needed) a store rooted at `root`, reading every
    /// entry once to index chunk ids by document.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| RagError::TextStoreError {
            backend: BACKEND.to_string(),
            message: format!("cannot create {}: {e}", root.display()),
        })?;
        let index = scan(&root).await?;
        debug!(root = %root.display(), documents = index.by_document.len(), "opened text store");
        Ok(Self { root, index: Arc::new(RwLock::new(index)) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.{EXTENSION}", escape_id(id)))
    }
}

/// Map a chunk id to a file name: unreserved characters are kept, every other
/// byte becomes `%XX`. The mapping is injective.
fn escape_id(id: &str) -> String {
    let mut escaped = String::with_capacity(id.len());
    for byte in id.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => escaped.push(byte as char),
            _ => escaped.push_str(&format!("%{byte:02X}")),
        }
    }
    escaped
}

async fn scan(root: &Path) -> Result<DocumentIndex> {
    let mut index = DocumentIndex::default();
    let mut dir = tokio::fs::read_dir(root).await?;
    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
            continue;
        }
        let Some(id) = path.file_stem().and_then(|s| s.to_str()).and_then(unescape_id) else {
            warn!(path = %path.display(), "skipping unrecognised file in text store");
            continue;
        };
        let bytes = tokio::fs::read(&path).await?;
        let stored: StoredText = serde_json::from_slice(&bytes)?;
        index.insert(&id, &stored.document_id);
    }
    Ok(index)
}

fn unescape_id(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[async_trait]
impl TextStore for FileTextStore {
    async fn put(&self, id: &str, entry: StoredText) -> Result<()> {
        let path = self.path_for(id);
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(&entry)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        self.index.write().await.insert(id, &entry.document_id);
        debug!(chunk_id = id, path = %path.display(), "stored chunk text");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<StoredText>> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let removed = match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        self.index.write().await.remove(id);
        Ok(removed)
    }

    async fn chunk_ids_for_document(&self, document_id: &str) -> Result<Vec<String>> {
        Ok(self
            .index
            .read()
            .await
            .by_document
            .get(document_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn entry(document_id: &str, text: &str) -> StoredText {
        StoredText {
            document_id: document_id.to_string(),
            ordinal: 0,
            text: text.to_string(),
            metadata: HashMap::from([("title".to_string(), "Guide".to_string())]),
        }
    }

    #[test]
    fn escaping_is_reversible() {
        for id in ["plain_0", "a/b c.txt_3", "ümlaut_1", "100%_2"] {
            let escaped = escape_id(id);
            assert!(escaped.bytes().all(|b| b.is_ascii_alphanumeric() || b"-_%".contains(&b)));
            assert_eq!(unescape_id(&escaped).as_deref(), Some(id));
        }
    }

    #[tokio::test]
    async fn put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTextStore::open(dir.path().join("text")).await.unwrap();

        store.put("guide/1_0", entry("guide/1", "first")).await.unwrap();
        store.put("guide/1_0", entry("guide/1", "second")).await.unwrap();
        let fetched = store.get("guide/1_0").await.unwrap().unwrap();
        assert_eq!(fetched.text, "second");
        assert_eq!(fetched.metadata.get("title").map(String::as_str), Some("Guide"));

        assert!(store.delete("guide/1_0").await.unwrap());
        assert_eq!(store.get("guide/1_0").await.unwrap(), None);
    }

    #[tokio::test]
    async fn lists_chunks_of_one_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTextStore::open(dir.path()).await.unwrap();
        store.put("a_1", entry("a", "x")).await.unwrap();
        store.put("a_0", entry("a", "y")).await.unwrap();
        store.put("b_0", entry("b", "z")).await.unwrap();
        assert_eq!(store.chunk_ids_for_document("a").await.unwrap(), ["a_0", "a_1"]);
    }

    #[tokio::test]
    async fn reopened_store_knows_its_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTextStore::open(dir.path()).await.unwrap();
        store.put("a_0", entry("a", "x")).await.unwrap();
        store.put("a_1", entry("a", "y")).await.unwrap();
        store.put("b_0", entry("b", "z")).await.unwrap();
        store.delete("a_1").await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not an entry").unwrap();

        let reopened = FileTextStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.chunk_ids_for_document("a").await.unwrap(), ["a_0"]);
        assert_eq!(reopened.chunk_ids_for_document("b").await.unwrap(), ["b_0"]);

        reopened.delete("b_0").await.unwrap();
        assert!(reopened.chunk_ids_for_document("b").await.unwrap().is_empty());
    }
}
