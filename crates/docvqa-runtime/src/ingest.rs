//! Offline indexing of statute text into the vector collection.
//!
//! Reads `.txt` and `.md` files from a directory, strips characters that
//! survive lossy decoding, splits them with [`TextChunker`], then recreates
//! the collection and upserts every chunk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value as JsonValue;
use thiserror::Error;

use docvqa_core::TextChunker;

use crate::collaborators::{IndexedChunk, QdrantSearch, SearchError};
use crate::config::IngestSettings;

lazy_static! {
    // Control characters other than tab and newline, plus the replacement
    // character left behind by invalid UTF-8
    static ref INVALID_CHARS: Regex =
        Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F\x{FFFD}]").unwrap();
}

const EXTENSIONS: [&str; 2] = ["txt", "md"];

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No .txt or .md files found in {0}")]
    NoDocuments(PathBuf),

    #[error("Indexing failed: {0}")]
    Search(#[from] SearchError),
}

/// One source file after cleanup.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceText {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub files: usize,
    pub chunks: usize,
    pub written: usize,
}

pub fn clean_text(text: &str) -> String {
    INVALID_CHARS.replace_all(text, "").into_owned()
}

/// Read every `.txt`/`.md` file directly under `dir`, sorted by file name.
pub async fn load_sources(dir: &Path) -> Result<Vec<SourceText>, IngestError> {
    let io_error = |source| IngestError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_error)?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        let path = entry.path();
        let wanted = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if wanted && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(&path).await.map_err(|source| IngestError::Io {
            path: path.clone(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        tracing::info!(file = %name, bytes = bytes.len(), "Read source file");
        sources.push(SourceText {
            name,
            content: clean_text(&String::from_utf8_lossy(&bytes)),
        });
    }

    Ok(sources)
}

/// Split sources into chunks tagged with `{source, chunk}` metadata.
pub fn chunk_sources(sources: &[SourceText], settings: &IngestSettings) -> Vec<IndexedChunk> {
    let chunker = TextChunker::new(settings.chunk_size, settings.chunk_overlap);

    sources
        .iter()
        .flat_map(|source| {
            chunker
                .chunk(&source.content)
                .into_iter()
                .enumerate()
                .map(|(index, content)| {
                    let mut metadata = BTreeMap::new();
                    metadata.insert("source".to_string(), JsonValue::from(source.name.clone()));
                    metadata.insert("chunk".to_string(), JsonValue::from(index));
                    IndexedChunk { content, metadata }
                })
        })
        .collect()
}

/// Rebuild the collection from the files in `dir`.
///
/// The existing collection is dropped only once the first batch has been
/// embedded.
pub async fn ingest(
    dir: &Path,
    settings: &IngestSettings,
    search: &QdrantSearch,
) -> Result<IngestSummary, IngestError> {
    let sources = load_sources(dir).await?;
    if sources.is_empty() {
        return Err(IngestError::NoDocuments(dir.to_path_buf()));
    }

    let chunks = chunk_sources(&sources, settings);
    tracing::info!(
        files = sources.len(),
        chunks = chunks.len(),
        collection = search.collection(),
        "Indexing chunks"
    );

    let written = search.rebuild(&chunks, settings.batch_size).await?;
    tracing::info!(written, "Ingestion complete");

    Ok(IngestSummary {
        files: sources.len(),
        chunks: chunks.len(),
        written,
    })
}
