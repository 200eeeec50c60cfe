//! File metadata store: the source of truth for "has this exact file been
//! seen".
//!
//! Records are kept idempotent by content hash: [`MetadataStore::record`]
//! appends a [`FileRecord`] only if no stored record shares its hash. The
//! whole load → check → write cycle runs under one async mutex, so two
//! concurrent ingestions of identical bytes cannot both add a record.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::debug;

use insightops_core::models::FileRecord;

use crate::error::StoreError;
use crate::json_store::{load_collection, write_collection};

/// Result of [`MetadataStore::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Added,
    AlreadyPresent,
}

pub struct MetadataStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored records, oldest first.
    pub async fn all(&self) -> Vec<FileRecord> {
        load_collection(&self.path).await
    }

    /// Whether a record with `content_hash` is stored.
    pub async fn contains(&self, content_hash: &str) -> bool {
        self.all()
            .await
            .iter()
            .any(|r| r.content_hash == content_hash)
    }

    /// Append `entry` unless its hash is already stored.
    ///
    /// Fails with [`StoreError::MissingField`] if the entry has no hash.
    pub async fn record(&self, entry: FileRecord) -> Result<RecordOutcome, StoreError> {
        if entry.content_hash.is_empty() {
            return Err(StoreError::MissingField("hash"));
        }

        let _guard = self.write_lock.lock().await;
        let mut records: Vec<FileRecord> = load_collection(&self.path).await;

        if records.iter().any(|r| r.content_hash == entry.content_hash) {
            debug!(hash = %entry.content_hash, "metadata already present");
            return Ok(RecordOutcome::AlreadyPresent);
        }

        records.push(entry);
        write_collection(&self.path, &records).await?;
        Ok(RecordOutcome::Added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    fn record(name: &str, hash: &str) -> FileRecord {
        FileRecord {
            filename: name.to_string(),
            content_hash: hash.to_string(),
            absolute_path: format!("/tmp/{}", name),
            size_bytes: 10,
            ingested_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn record_is_idempotent_by_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("metadata.json"));

        assert_eq!(
            store.record(record("a.txt", "h1")).await.unwrap(),
            RecordOutcome::Added
        );
        // same bytes under another name is still the same file
        assert_eq!(
            store.record(record("copy-of-a.txt", "h1")).await.unwrap(),
            RecordOutcome::AlreadyPresent
        );
        assert_eq!(
            store.record(record("b.txt", "h2")).await.unwrap(),
            RecordOutcome::Added
        );

        let all = store.all().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].filename, "a.txt");
        assert!(store.contains("h2").await);
        assert!(!store.contains("h3").await);
    }

    #[tokio::test]
    async fn missing_hash_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("metadata.json"));
        let err = store.record(record("a.txt", "")).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingField("hash")));
        assert!(store.all().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_store_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = MetadataStore::new(&path);
        assert!(store.all().await.is_empty());
        assert_eq!(
            store.record(record("a.txt", "h1")).await.unwrap(),
            RecordOutcome::Added
        );
        assert_eq!(store.all().await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_records_of_same_hash_add_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MetadataStore::new(dir.path().join("metadata.json")));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.record(record(&format!("f{}.txt", i), "same")).await
            }));
        }
        let mut added = 0;
        for h in handles {
            if h.await.unwrap().unwrap() == RecordOutcome::Added {
                added += 1;
            }
        }
        assert_eq!(added, 1);
        assert_eq!(store.all().await.len(), 1);
    }
}
