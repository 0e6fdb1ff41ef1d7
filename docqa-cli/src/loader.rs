//! Reading documents from disk.
//!
//! - `.txt` / `.md`: one document per file; title is the file name and
//!   source the path. The id is the file stem for a file named directly, and
//!   the path below the directory without extension (`tax/gst`) for a file
//!   found by walking one.
//! - `.jsonl`: one `{id, title, url, text, page?}` record per line.
//!
//! Directories are walked recursively; other extensions are skipped. Two
//! documents with the same id are an error.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use docqa_rag::Document;
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct Record {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    text: String,
    #[serde(default)]
    page: Option<u32>,
}

impl From<Record> for Document {
    fn from(record: Record) -> Self {
        let mut document = Document::new(record.id, record.text);
        if let Some(title) = record.title {
            document = document.with_title(title);
        }
        if let Some(url) = record.url {
            document = document.with_source_uri(url);
        }
        if let Some(page) = record.page {
            document = document.with_page(page);
        }
        document
    }
}

/// A file to load and the argument it was found under.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Found {
    path: PathBuf,
    base: PathBuf,
}

/// Load every supported document under `paths`, in path order.
pub async fn load_documents(paths: &[PathBuf]) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    let mut origins: HashMap<String, PathBuf> = HashMap::new();
    for file in collect_files(paths).await? {
        let loaded = load_file(&file).await?;
        debug!(path = %file.path.display(), documents = loaded.len(), "loaded file");
        for document in loaded {
            if let Some(first) = origins.insert(document.id.clone(), file.path.clone()) {
                bail!(
                    "document id '{}' is used by both {} and {}",
                    document.id,
                    first.display(),
                    file.path.display()
                );
            }
            documents.push(document);
        }
    }
    Ok(documents)
}

async fn collect_files(paths: &[PathBuf]) -> Result<Vec<Found>> {
    let mut files = Vec::new();
    let mut pending: Vec<Found> =
        paths.iter().map(|p| Found { path: p.clone(), base: p.clone() }).collect();
    while let Some(Found { path, base }) = pending.pop() {
        let metadata = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        if metadata.is_dir() {
            let mut entries = tokio::fs::read_dir(&path).await?;
            while let Some(entry) = entries.next_entry().await? {
                pending.push(Found { path: entry.path(), base: base.clone() });
            }
        } else if is_supported(&path) {
            files.push(Found { path, base });
        } else if path == base {
            bail!("unsupported file type: {}", path.display());
        } else {
            debug!(path = %path.display(), "skipping unsupported file");
        }
    }
    files.sort();
    Ok(files)
}

/// `tax/gst` for `<base>/tax/gst.md`; the file stem when `path` is `base`.
fn document_id(found: &Found) -> Option<String> {
    let relative = found.path.strip_prefix(&found.base).ok().filter(|r| !r.as_os_str().is_empty());
    let Some(relative) = relative else {
        return found.path.file_stem()?.to_str().map(str::to_string);
    };
    let relative = relative.with_extension("");
    let parts = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

fn extension(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase)
}

fn is_supported(path: &Path) -> bool {
    matches!(extension(path).as_deref(), Some("txt" | "md" | "jsonl"))
}

async fn load_file(found: &Found) -> Result<Vec<Document>> {
    let path = found.path.as_path();
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;

    if extension(path).as_deref() == Some("jsonl") {
        return parse_jsonl(&content).with_context(|| format!("in {}", path.display()));
    }

    let Some(id) = document_id(found) else {
        bail!("file name is not valid UTF-8: {}", path.display());
    };
    let title = path.file_name().and_then(|s| s.to_str()).unwrap_or(&id).to_string();
    if content.trim().is_empty() {
        warn!(path = %path.display(), "file is empty");
    }
    Ok(vec![
        Document::new(id, content)
            .with_title(title)
            .with_source_uri(path.display().to_string()),
    ])
}

fn parse_jsonl(content: &str) -> Result<Vec<Document>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            let record: Record =
                serde_json::from_str(line).with_context(|| format!("line {}", n + 1))?;
            Ok(record.into())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonl_records_become_documents() {
        let content = r#"{"id":"ato-gst-guide","title":"ATO GST Guide","url":"https://ato.example/gst","text":"Register for GST at $75,000.","page":3}

{"id":"bas","text":"Lodge your BAS."}"#;
        let documents = parse_jsonl(content).unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].id, "ato-gst-guide");
        assert_eq!(documents[0].title(), Some("ATO GST Guide"));
        assert_eq!(documents[0].source_uri.as_deref(), Some("https://ato.example/gst"));
        assert_eq!(documents[0].page(), Some(3));
        assert_eq!(documents[1].title(), None);
    }

    #[test]
    fn bad_jsonl_line_is_reported() {
        let err = parse_jsonl("{\"id\":\"a\",\"text\":\"ok\"}\nnot json").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[tokio::test]
    async fn directories_are_walked() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gst.md"), "# GST\nThreshold is $75,000.").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/bas.txt"), "Lodge quarterly.").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let documents = load_documents(&[dir.path().to_path_buf()]).await.unwrap();
        let ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["gst", "nested/bas"]);
        assert_eq!(documents[0].title(), Some("gst.md"));
        assert_eq!(documents[1].title(), Some("bas.txt"));
    }

    #[tokio::test]
    async fn same_stem_in_different_folders_gets_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        for folder in ["a", "b"] {
            std::fs::create_dir(dir.path().join(folder)).unwrap();
        }
        std::fs::write(dir.path().join("a/guide.md"), "GST guide").unwrap();
        std::fs::write(dir.path().join("b/guide.txt"), "BAS guide").unwrap();

        let documents = load_documents(&[dir.path().to_path_buf()]).await.unwrap();
        let ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["a/guide", "b/guide"]);
    }

    #[tokio::test]
    async fn colliding_ids_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("guide.md"), "markdown").unwrap();
        std::fs::write(dir.path().join("guide.txt"), "text").unwrap();
        std::fs::write(
            dir.path().join("records.jsonl"),
            "{\"id\":\"bas\",\"text\":\"one\"}\n{\"id\":\"bas\",\"text\":\"two\"}\n",
        )
        .unwrap();

        let err = load_documents(&[dir.path().join("guide.md"), dir.path().join("guide.txt")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'guide'"));

        let err = load_documents(&[dir.path().join("records.jsonl")]).await.unwrap_err();
        assert!(err.to_string().contains("'bas'"));
    }

    #[tokio::test]
    async fn explicit_unsupported_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, "binary").unwrap();
        assert!(load_documents(&[path]).await.is_err());
    }
}
