// MindHarbor - Document ingestion
//
// Turns already-extracted plain text into immutable `Document`s. Format
// decoding (PDF and friends) happens upstream; a source only hands over text,
// a label for citation and the kind of file it came from.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Where a document's text originally came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    PlainText,
    Markdown,
}

impl DocumentKind {
    /// Classify a file name. PDFs arrive as `<name>.pdf.txt` sidecars holding
    /// text extracted upstream.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.ends_with(".pdf.txt") {
            Some(Self::Pdf)
        } else if lower.ends_with(".txt") {
            Some(Self::PlainText)
        } else if lower.ends_with(".md") || lower.ends_with(".markdown") {
            Some(Self::Markdown)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::PlainText => "plain_text",
            Self::Markdown => "markdown",
        }
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported document kind: {0}")]
    UnsupportedKind(String),
    #[error("document {0} has no text")]
    EmptyText(String),
}

/// Text handed over by a document source, before it gets an identity.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub text: String,
    pub source_label: String,
    pub kind: DocumentKind,
}

impl RawDocument {
    pub fn new(text: impl Into<String>, source_label: impl Into<String>, kind: DocumentKind) -> Self {
        Self {
            text: text.into(),
            source_label: source_label.into(),
            kind,
        }
    }
}

/// An ingested unit of knowledge. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    id: String,
    text: String,
    source_label: String,
    kind: DocumentKind,
}

impl Document {
    fn from_raw(raw: RawDocument) -> Result<Self, IngestError> {
        if raw.text.trim().is_empty() {
            return Err(IngestError::EmptyText(raw.source_label));
        }
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: raw.text,
            source_label: raw.source_label,
            kind: raw.kind,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source_label(&self) -> &str {
        &self.source_label
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }
}

/// Anything that can hand over a batch of documents.
pub trait DocumentSource {
    fn load(&self) -> Vec<Result<RawDocument, IngestError>>;
}

/// Reads every supported file directly inside a directory.
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read_one(path: &Path, kind: DocumentKind) -> Result<RawDocument, IngestError> {
        let text = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Ok(RawDocument::new(text, label, kind))
    }
}

impl DocumentSource for DirectorySource {
    fn load(&self) -> Vec<Result<RawDocument, IngestError>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::info!(dir = %self.dir.display(), "Documents directory not readable ({}), corpus is empty", e);
                return Vec::new();
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        // Stable order keeps the vocabulary layout reproducible between runs
        paths.sort();

        let mut out = Vec::new();
        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            match DocumentKind::from_file_name(&name) {
                Some(kind) => out.push(Self::read_one(&path, kind)),
                // Binary PDFs need upstream extraction into a `.pdf.txt` sidecar
                None if name.to_lowercase().ends_with(".pdf") => {
                    out.push(Err(IngestError::UnsupportedKind(name)));
                }
                None => tracing::debug!(file = %name, "Skipping unsupported file"),
            }
        }
        out
    }
}

/// In-memory documents, mostly for tests and embedding the engine.
#[derive(Default)]
pub struct StaticSource {
    documents: Vec<RawDocument>,
}

impl StaticSource {
    pub fn new(documents: Vec<RawDocument>) -> Self {
        Self { documents }
    }
}

impl DocumentSource for StaticSource {
    fn load(&self) -> Vec<Result<RawDocument, IngestError>> {
        self.documents.iter().cloned().map(Ok).collect()
    }
}

/// Outcome of a batch ingest: what made it in and what did not.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub documents: Vec<Document>,
    pub failures: Vec<IngestError>,
}

/// Ingest everything a source offers. A failing document never aborts the batch.
pub fn ingest(source: &dyn DocumentSource) -> IngestReport {
    let mut report = IngestReport::default();

    for item in source.load() {
        match item.and_then(Document::from_raw) {
            Ok(doc) => {
                tracing::info!(source = %doc.source_label(), kind = doc.kind().as_str(), "Loaded document");
                report.documents.push(doc);
            }
            Err(e) => {
                tracing::warn!("Skipping document: {}", e);
                report.failures.push(e);
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_kind_from_file_name() {
        assert_eq!(DocumentKind::from_file_name("guide.pdf.txt"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_file_name("NOTES.TXT"), Some(DocumentKind::PlainText));
        assert_eq!(DocumentKind::from_file_name("faq.md"), Some(DocumentKind::Markdown));
        assert_eq!(DocumentKind::from_file_name("scan.pdf"), None);
    }

    #[test]
    fn test_directory_source_reads_supported_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "Sleep hygiene basics").unwrap();
        std::fs::write(tmp.path().join("b.md"), "# Breathing\nSlow breaths").unwrap();
        std::fs::write(tmp.path().join("c.pdf"), [0u8, 1, 2]).unwrap();

        std::fs::write(tmp.path().join("d.png"), [0u8]).unwrap();

        let report = ingest(&DirectorySource::new(tmp.path()));
        assert_eq!(report.documents.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], IngestError::UnsupportedKind(_)));
        assert_eq!(report.documents[0].source_label(), "a.txt");
        assert_eq!(report.documents[1].kind(), DocumentKind::Markdown);
    }

    #[test]
    fn test_missing_directory_is_empty_corpus() {
        let tmp = TempDir::new().unwrap();
        let report = ingest(&DirectorySource::new(tmp.path().join("nope")));
        assert!(report.documents.is_empty());
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_failures_do_not_abort_batch() {
        let source = StaticSource::new(vec![
            RawDocument::new("   \n ", "blank.txt", DocumentKind::PlainText),
            RawDocument::new("Gratitude journaling", "ok.txt", DocumentKind::PlainText),
        ]);
        let report = ingest(&source);
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], IngestError::EmptyText(_)));
    }

    #[test]
    fn test_documents_get_distinct_ids() {
        let source = StaticSource::new(vec![
            RawDocument::new("one", "1.txt", DocumentKind::PlainText),
            RawDocument::new("two", "2.txt", DocumentKind::PlainText),
        ]);
        let report = ingest(&source);
        assert_ne!(report.documents[0].id(), report.documents[1].id());
    }
}
