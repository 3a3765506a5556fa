//! Document source collaborator
//!
//! Documents are plain text. `.pdf` names are served from their extracted
//! `.txt` sibling; any other extension is reported missing.

use async_trait::async_trait;
use parking_lot::RwLock;
use qa_artifact::SuiteId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// One plain-text document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// File name, e.g. `spec.txt`
    pub name: String,
    /// Text, possibly truncated
    pub text: String,
}

/// Result of fetching documents into a suite
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchReport {
    /// Names stored for the suite (normalized)
    pub stored: Vec<String>,
    /// Names as requested that could not be stored
    pub missing: Vec<String>,
}

/// Supplies the documents of a suite
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Copy the named documents from blob storage into the suite
    ///
    /// # Errors
    /// Returns an I/O error only for failures other than a missing blob
    async fn fetch(&self, suite_id: &SuiteId, names: &[String]) -> std::io::Result<FetchReport>;

    /// Documents available for the suite, sorted by name
    ///
    /// An empty list is a valid outcome meaning "no documents".
    ///
    /// # Errors
    /// Returns an I/O error if the suite's documents cannot be listed
    async fn documents(&self, suite_id: &SuiteId, max_chars: usize) -> std::io::Result<Vec<Document>>;
}

/// Map a requested name to the stored `.txt` name
///
/// Directory components are dropped. Returns `None` for unsupported
/// extensions.
#[must_use]
pub fn normalize_doc_name(raw: &str) -> Option<String> {
    let name = Path::new(raw).file_name()?.to_str()?;
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".txt") {
        Some(name.to_string())
    } else if lower.ends_with(".pdf") {
        Some(format!("{}.txt", &name[..name.len() - 4]))
    } else {
        None
    }
}

/// Cut `text` to `max_chars` characters, marking the cut
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\n\n[...truncated...]", &text[..idx]),
        None => text.to_string(),
    }
}

/// Render documents as `DOC_NAME` / `DOC_TEXT` / `END_DOC` blocks
#[must_use]
pub fn bundle(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|d| format!("DOC_NAME: {}\nDOC_TEXT:\n{}\nEND_DOC", d.name, d.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Documents held in memory, keyed by suite
///
/// `fetch` copies from a shared blob map into the suite.
#[derive(Debug, Default)]
pub struct InMemoryDocumentSource {
    blobs: RwLock<HashMap<String, String>>,
    suites: RwLock<HashMap<SuiteId, BTreeMap<String, Document>>>,
}

impl InMemoryDocumentSource {
    /// Empty source
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a blob available for fetching
    pub fn put_blob(&self, name: impl Into<String>, text: impl Into<String>) {
        self.blobs.write().insert(name.into(), text.into());
    }

    /// Attach a document directly to a suite
    pub fn put_document(&self, suite_id: &SuiteId, name: impl Into<String>, text: impl Into<String>) {
        let doc = Document {
            name: name.into(),
            text: text.into(),
        };
        self.suites
            .write()
            .entry(suite_id.clone())
            .or_default()
            .insert(doc.name.clone(), doc);
    }
}

#[async_trait]
impl DocumentSource for InMemoryDocumentSource {
    async fn fetch(&self, suite_id: &SuiteId, names: &[String]) -> std::io::Result<FetchReport> {
        let mut report = FetchReport::default();
        for raw in names {
            let text = normalize_doc_name(raw).and_then(|name| {
                let text = self.blobs.read().get(&name).cloned()?;
                Some((name, text))
            });
            match text {
                Some((name, text)) => {
                    self.put_document(suite_id, name.clone(), text);
                    report.stored.push(name);
                }
                None => report.missing.push(raw.clone()),
            }
        }
        Ok(report)
    }

    async fn documents(&self, suite_id: &SuiteId, max_chars: usize) -> std::io::Result<Vec<Document>> {
        let suites = self.suites.read();
        Ok(suites
            .get(suite_id)
            .map(|docs| {
                docs.values()
                    .map(|d| Document {
                        name: d.name.clone(),
                        text: truncate_chars(&d.text, max_chars),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Filesystem-backed documents
///
/// Blobs live flat under `blob_root`; fetched documents are copied to
/// `sessions_root/<suite>/docs/`.
#[derive(Debug, Clone)]
pub struct DirectoryDocumentSource {
    blob_root: PathBuf,
    sessions_root: PathBuf,
}

impl DirectoryDocumentSource {
    /// Create a source over two directories
    #[must_use]
    pub fn new(blob_root: impl Into<PathBuf>, sessions_root: impl Into<PathBuf>) -> Self {
        Self {
            blob_root: blob_root.into(),
            sessions_root: sessions_root.into(),
        }
    }

    fn docs_dir(&self, suite_id: &SuiteId) -> PathBuf {
        self.sessions_root.join(suite_id.as_str()).join("docs")
    }
}

#[async_trait]
impl DocumentSource for DirectoryDocumentSource {
    async fn fetch(&self, suite_id: &SuiteId, names: &[String]) -> std::io::Result<FetchReport> {
        let docs_dir = self.docs_dir(suite_id);
        let mut report = FetchReport::default();
        for raw in names {
            let Some(name) = normalize_doc_name(raw) else {
                report.missing.push(raw.clone());
                continue;
            };
            let text = match tokio::fs::read(self.blob_root.join(&name)).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    report.missing.push(raw.clone());
                    continue;
                }
                Err(e) => return Err(e),
            };
            tokio::fs::create_dir_all(&docs_dir).await?;
            tokio::fs::write(docs_dir.join(&name), text).await?;
            report.stored.push(name);
        }
        tracing::debug!(
            "Fetched documents for {}: stored={:?} missing={:?}",
            suite_id,
            report.stored,
            report.missing
        );
        Ok(report)
    }

    async fn documents(&self, suite_id: &SuiteId, max_chars: usize) -> std::io::Result<Vec<Document>> {
        let docs_dir = self.docs_dir(suite_id);
        let mut entries = match tokio::fs::read_dir(&docs_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut docs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_txt = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("txt"));
            if !is_txt {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            let text = String::from_utf8_lossy(&bytes);
            docs.push(Document {
                name: entry.file_name().to_string_lossy().into_owned(),
                text: truncate_chars(&text, max_chars),
            });
        }
        docs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(docs)
    }
}
