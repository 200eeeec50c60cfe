//! Durable, append-only chunk log.
//!
//! Every chunk produced by ingestion is appended here, tagged with its
//! file's content hash and a 0-based position. The log never deduplicates:
//! ingesting the same bytes twice appends the same `(hash, chunk_id)` keys
//! again, and the vector indexer absorbs the repeats by id.
//!
//! Only one writer may run the read-modify-write cycle at a time.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::debug;

use insightops_core::models::Chunk;

use crate::error::StoreError;
use crate::json_store::{load_collection, write_collection};

pub struct ChunkLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ChunkLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every chunk ever written, in write order.
    pub async fn load(&self) -> Vec<Chunk> {
        load_collection(&self.path).await
    }

    /// Append `texts` as chunks `0..n` of the file identified by
    /// `content_hash`, and return the chunks that were written.
    pub async fn save_chunks<I>(
        &self,
        file_name: &str,
        content_hash: &str,
        texts: I,
    ) -> Result<Vec<Chunk>, StoreError>
    where
        I: IntoIterator<Item = String>,
    {
        if content_hash.is_empty() {
            return Err(StoreError::MissingField("hash"));
        }

        let new_chunks: Vec<Chunk> = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                file_name: file_name.to_string(),
                content_hash: content_hash.to_string(),
                chunk_id: i as u32,
                text,
            })
            .collect();

        if new_chunks.is_empty() {
            return Ok(new_chunks);
        }

        let _guard = self.write_lock.lock().await;
        let mut log: Vec<Chunk> = load_collection(&self.path).await;
        log.extend(new_chunks.iter().cloned());
        write_collection(&self.path, &log).await?;

        debug!(
            file = file_name,
            appended = new_chunks.len(),
            total = log.len(),
            "chunk log updated"
        );
        Ok(new_chunks)
    }
}
