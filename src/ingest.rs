//! Single-file ingestion pipeline.
//!
//! [`Pipeline::process_file`] is the one entry point shared by the CLI,
//! the queue watcher, and the upload endpoint:
//!
//! 1. hash the file bytes
//! 2. stop with [`ProcessStatus::Skipped`] if the hash is already recorded
//! 3. extract text by suffix
//! 4. clean → chunk → append to the chunk log → embed the new chunks
//! 5. record the [`FileRecord`]
//! 6. optionally move the file into the processed directory
//!
//! Extraction problems, embedding failures, and move failures are logged
//! and reported in the outcome's `note`; they never fail the call. Only I/O
//! on the input file and store write failures surface as [`IngestError`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use insightops_core::models::FileRecord;
use insightops_core::normalize::{chunk_text, clean_text};

use crate::chunk_log::ChunkLog;
use crate::error::IngestError;
use crate::extract::{extract_file, Extraction};
use crate::hashing::compute_file_hash;
use crate::indexer::VectorIndexer;
use crate::metadata::{MetadataStore, RecordOutcome};

/// Message reported for content that was ingested before.
pub const ALREADY_INDEXED: &str = "File already indexed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Ok,
    Skipped,
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutcome {
    pub status: ProcessStatus,
    pub filename: String,
    pub hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vectors_added: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ProcessOutcome {
    pub fn is_skipped(&self) -> bool {
        self.status == ProcessStatus::Skipped
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Words per chunk.
    pub chunk_size: usize,
    /// Where handled files are moved. `None` leaves them in place.
    pub processed_dir: Option<PathBuf>,
}

pub struct Pipeline {
    metadata: Arc<MetadataStore>,
    chunk_log: Arc<ChunkLog>,
    indexer: Arc<VectorIndexer>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        metadata: Arc<MetadataStore>,
        chunk_log: Arc<ChunkLog>,
        indexer: Arc<VectorIndexer>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            metadata,
            chunk_log,
            indexer,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Ingest one file. Safe to call repeatedly with the same content.
    pub async fn process_file(&self, path: &Path) -> Result<ProcessOutcome, IngestError> {
        let fs_meta = match tokio::fs::metadata(path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(IngestError::NotFound(path.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IngestError::NotFound(path.to_path_buf()))
            }
            Err(source) => {
                return Err(IngestError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let owned = path.to_path_buf();
        let hash = tokio::task::spawn_blocking(move || compute_file_hash(&owned))
            .await?
            .map_err(|source| IngestError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        if self.metadata.contains(&hash).await {
            info!(file = %filename, hash = %hash, "skipped: already indexed");
            self.move_if_configured(path).await;
            return Ok(ProcessOutcome {
                status: ProcessStatus::Skipped,
                filename,
                hash,
                chunks: None,
                vectors_added: None,
                note: Some(ALREADY_INDEXED.to_string()),
            });
        }

        let owned = path.to_path_buf();
        let extraction = tokio::task::spawn_blocking(move || extract_file(&owned)).await?;

        let mut note = None;
        let mut chunk_count = 0usize;
        let mut vectors_added = 0usize;

        match extraction.usable_text() {
            Some(text) => {
                let cleaned = clean_text(text);
                let chunks = self
                    .chunk_log
                    .save_chunks(
                        &filename,
                        &hash,
                        chunk_text(&cleaned, self.settings.chunk_size),
                    )
                    .await?;
                chunk_count = chunks.len();
                info!(file = %filename, chunks = chunk_count, "chunks created");

                match self.indexer.upsert_new(&chunks).await {
                    Ok(added) => vectors_added = added,
                    Err(e) => {
                        warn!(file = %filename, error = %e, "embedding failed; run reindex to retry");
                        note = Some(format!("embedding deferred: {}", e));
                    }
                }
            }
            None => {
                note = Some(match &extraction {
                    Extraction::Unsupported => "unsupported file type; metadata only".to_string(),
                    Extraction::Failed(reason) => format!("extraction failed: {}", reason),
                    Extraction::Text(_) => "no extractable text".to_string(),
                });
                debug!(file = %filename, "no text to chunk");
            }
        }

        let absolute_path = tokio::fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_path_buf());
        let record = FileRecord {
            filename: filename.clone(),
            content_hash: hash.clone(),
            absolute_path: absolute_path.display().to_string(),
            size_bytes: fs_meta.len(),
            ingested_at: Utc::now(),
        };
        if self.metadata.record(record).await? == RecordOutcome::AlreadyPresent {
            // a concurrent call with the same bytes got there first
            debug!(hash = %hash, "metadata recorded concurrently");
        }

        info!(file = %filename, hash = %hash, vectors = vectors_added, "file processed");
        self.move_if_configured(path).await;

        Ok(ProcessOutcome {
            status: ProcessStatus::Ok,
            filename,
            hash,
            chunks: Some(chunk_count),
            vectors_added: Some(vectors_added),
            note,
        })
    }

    async fn move_if_configured(&self, path: &Path) {
        let Some(dir) = &self.settings.processed_dir else {
            return;
        };
        match move_into(path, dir).await {
            Ok(Some(dest)) => debug!(from = %path.display(), to = %dest.display(), "moved processed file"),
            Ok(None) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to move processed file"),
        }
    }
}

/// Move `path` into `dir`, keeping its file name. Falls back to copy and
/// remove when a rename crosses filesystems. Returns `None` if the file
/// already lives in `dir`.
async fn move_into(path: &Path, dir: &Path) -> std::io::Result<Option<PathBuf>> {
    tokio::fs::create_dir_all(dir).await?;

    let file_name = path
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"))?;
    let dest = dir.join(file_name);

    if let (Ok(src_parent), Ok(dest_dir)) = (
        tokio::fs::canonicalize(path.parent().unwrap_or(Path::new("."))).await,
        tokio::fs::canonicalize(dir).await,
    ) {
        if src_parent == dest_dir {
            return Ok(None);
        }
    }

    if tokio::fs::rename(path, &dest).await.is_err() {
        tokio::fs::copy(path, &dest).await?;
        tokio::fs::remove_file(path).await?;
    }
    Ok(Some(dest))
}
