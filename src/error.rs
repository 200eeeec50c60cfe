//! Error types for the ingestion side of InsightOps.
//!
//! Trait seams (`VectorIndex`, `EmbeddingProvider`) and CLI glue use
//! `anyhow`; the stores and the pipeline return these typed errors so
//! callers such as the HTTP layer can tell a bad input from a broken
//! store.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of the JSON metadata store and chunk log.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record missing required field '{0}'")]
    MissingField(&'static str),
}

/// Failures of [`Pipeline::process_file`](crate::ingest::Pipeline::process_file).
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Input file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Returned by the disabled embedding provider for every call.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Embeddings are disabled (embedding.provider = \"disabled\")")]
pub struct EmbeddingsDisabled;
