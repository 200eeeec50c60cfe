//! Core data models used throughout InsightOps.
//!
//! These types describe the files, chunks, vectors, and query results that
//! flow through the ingestion and retrieval pipeline. On-disk field names
//! (`file`, `hash`, `path`, ...) are kept short via `serde(rename)` so the
//! JSON stores stay readable by hand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Build the vector-index id for a chunk: `"<content_hash>:<chunk_id>"`.
///
/// The id is a pure function of file content and chunk position, which is
/// what makes re-indexing the full chunk log idempotent.
pub fn vector_id(content_hash: &str, chunk_id: u32) -> String {
    format!("{}:{}", content_hash, chunk_id)
}

/// Ingestion metadata for one physical file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    /// Hex SHA-256 of the file bytes. The identity key of the record.
    #[serde(rename = "hash", default)]
    pub content_hash: String,
    #[serde(rename = "path")]
    pub absolute_path: String,
    pub size_bytes: u64,
    pub ingested_at: DateTime<Utc>,
}

/// A fixed-size window of a document's cleaned text.
///
/// The natural key is `(content_hash, chunk_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(rename = "file")]
    pub file_name: String,
    #[serde(rename = "hash")]
    pub content_hash: String,
    pub chunk_id: u32,
    pub text: String,
}

impl Chunk {
    pub fn vector_id(&self) -> String {
        vector_id(&self.content_hash, self.chunk_id)
    }

    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            file_name: self.file_name.clone(),
            content_hash: self.content_hash.clone(),
            chunk_id: self.chunk_id,
        }
    }
}

/// Metadata stored next to every vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(rename = "file")]
    pub file_name: String,
    #[serde(rename = "hash")]
    pub content_hash: String,
    #[serde(rename = "chunk")]
    pub chunk_id: u32,
}

/// One embedded chunk as held by a [`VectorIndex`](crate::index::VectorIndex).
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
    /// The chunk text, kept alongside the vector so query results can be
    /// rendered without a second lookup.
    pub text: String,
}

/// A raw hit returned by [`VectorIndex::nearest`](crate::index::VectorIndex::nearest).
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    /// Distance to the query vector; smaller is closer. Backends that
    /// cannot report a distance return `None`.
    pub distance: Option<f32>,
    pub metadata: ChunkMetadata,
    pub text: String,
}

/// A formatted search hit, built per query and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    #[serde(rename = "file")]
    pub file_name: String,
    #[serde(rename = "chunk")]
    pub chunk_id: u32,
    #[serde(rename = "hash")]
    pub content_hash: String,
    pub snippet: String,
    #[serde(rename = "full")]
    pub full_text: String,
    pub distance: Option<f32>,
}

/// A distinct `(file_name, content_hash)` pair present in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedFile {
    #[serde(rename = "file")]
    pub file_name: String,
    #[serde(rename = "hash")]
    pub content_hash: String,
    pub chunks: usize,
}

/// Summary counts for the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub total_files: usize,
    pub files: Vec<IndexedFile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_id_joins_hash_and_position() {
        assert_eq!(vector_id("abc123", 0), "abc123:0");
        assert_eq!(vector_id("abc123", 17), "abc123:17");
    }

    #[test]
    fn chunk_serializes_with_short_field_names() {
        let chunk = Chunk {
            file_name: "notes.txt".to_string(),
            content_hash: "deadbeef".to_string(),
            chunk_id: 2,
            text: "hello".to_string(),
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["file"], "notes.txt");
        assert_eq!(json["hash"], "deadbeef");
        assert_eq!(json["chunk_id"], 2);
        assert_eq!(chunk.vector_id(), "deadbeef:2");
    }

    #[test]
    fn file_record_without_hash_deserializes_empty() {
        let json = r#"{
            "filename": "a.txt",
            "path": "/tmp/a.txt",
            "size_bytes": 3,
            "ingested_at": "2024-01-01T00:00:00Z"
        }"#;
        let record: FileRecord = serde_json::from_str(json).unwrap();
        assert!(record.content_hash.is_empty());
    }
}
