//! Vector indexer: turns chunks into stored embeddings, at most once each.
//!
//! Before embedding anything, [`VectorIndexer::upsert_new`] fetches the
//! ids already present in the index and drops every chunk whose
//! `content_hash:chunk_id` is among them (or repeats an earlier chunk of
//! the same call). Only the remainder is sent to the embedding provider,
//! in batches of `batch_size`. Since the id is a pure function of file
//! content and chunk position, replaying the whole chunk log after a
//! restart adds nothing that is already there.
//!
//! The check → embed → upsert sequence runs under one async mutex so two
//! concurrent ingestions cannot both decide the same id is new.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::Mutex;
use tracing::{debug, info};

use insightops_core::embedding::EmbeddingProvider;
use insightops_core::index::VectorIndex;
use insightops_core::models::{Chunk, VectorEntry};

use crate::chunk_log::ChunkLog;

pub struct VectorIndexer {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunk_log: Arc<ChunkLog>,
    batch_size: usize,
    write_lock: Mutex<()>,
}

impl VectorIndexer {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunk_log: Arc<ChunkLog>,
        batch_size: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            chunk_log,
            batch_size: batch_size.max(1),
            write_lock: Mutex::new(()),
        }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Embed and store the chunks whose ids are not yet indexed. Returns
    /// the number of vectors added.
    pub async fn upsert_new(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            debug!("no new chunks to index");
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;

        let mut seen: HashSet<String> = self.index.ids().await?;
        let fresh: Vec<&Chunk> = chunks
            .iter()
            .filter(|chunk| seen.insert(chunk.vector_id()))
            .collect();

        if fresh.is_empty() {
            debug!(offered = chunks.len(), "no new chunks to index");
            return Ok(0);
        }

        let mut added = 0usize;
        for batch in fresh.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                bail!(
                    "embedding provider returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                );
            }

            let entries: Vec<VectorEntry> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, embedding)| VectorEntry {
                    id: chunk.vector_id(),
                    embedding,
                    metadata: chunk.metadata(),
                    text: chunk.text.clone(),
                })
                .collect();
            added += self.index.upsert(&entries).await?;
        }

        info!(
            added,
            skipped = chunks.len() - fresh.len(),
            model = self.embedder.model_name(),
            "vectors added"
        );
        Ok(added)
    }

    /// Feed the entire chunk log through [`upsert_new`](Self::upsert_new).
    pub async fn sync_from_log(&self) -> Result<usize> {
        let chunks = self.chunk_log.load().await;
        debug!(chunks = chunks.len(), "syncing index from chunk log");
        self.upsert_new(&chunks).await
    }

    /// Build the index from the chunk log if it holds no vectors yet.
    pub async fn ensure_built(&self) -> Result<usize> {
        if self.index.is_empty().await? {
            self.sync_from_log().await
        } else {
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use insightops_core::index::memory::InMemoryVectorIndex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts how many texts it was asked to embed.
    #[derive(Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
        texts: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            bail!("model offline")
        }
    }

    fn chunk(hash: &str, chunk_id: u32) -> Chunk {
        Chunk {
            file_name: format!("{}.txt", hash),
            content_hash: hash.to_string(),
            chunk_id,
            text: format!("text for {} {}", hash, chunk_id),
        }
    }

    fn indexer(
        dir: &tempfile::TempDir,
        embedder: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> (VectorIndexer, Arc<ChunkLog>) {
        let log = Arc::new(ChunkLog::new(dir.path().join("chunks.json")));
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());
        (
            VectorIndexer::new(index, embedder, log.clone(), batch_size),
            log,
        )
    }

    #[tokio::test]
    async fn embeds_each_id_at_most_once() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(CountingEmbedder::default());
        let (indexer, _) = indexer(&dir, embedder.clone(), 64);

        let chunks = vec![chunk("a", 0), chunk("a", 1), chunk("a", 0)];
        assert_eq!(indexer.upsert_new(&chunks).await.unwrap(), 2);
        assert_eq!(embedder.texts.load(Ordering::SeqCst), 2);

        assert_eq!(indexer.upsert_new(&chunks).await.unwrap(), 0);
        assert_eq!(embedder.texts.load(Ordering::SeqCst), 2);
        assert_eq!(indexer.index().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn batches_by_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(CountingEmbedder::default());
        let (indexer, _) = indexer(&dir, embedder.clone(), 2);

        let chunks: Vec<Chunk> = (0..5).map(|i| chunk("b", i)).collect();
        assert_eq!(indexer.upsert_new(&chunks).await.unwrap(), 5);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_input_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(CountingEmbedder::default());
        let (indexer, _) = indexer(&dir, embedder.clone(), 8);
        assert_eq!(indexer.upsert_new(&[]).await.unwrap(), 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ensure_built_replays_log_only_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(CountingEmbedder::default());
        let (indexer, log) = indexer(&dir, embedder.clone(), 8);

        log.save_chunks("c.txt", "c", vec!["one".to_string(), "two".to_string()])
            .await
            .unwrap();
        // replays of the same file in the log collapse onto the same ids
        log.save_chunks("c.txt", "c", vec!["one".to_string(), "two".to_string()])
            .await
            .unwrap();

        assert_eq!(indexer.ensure_built().await.unwrap(), 2);
        assert_eq!(indexer.ensure_built().await.unwrap(), 0);
        assert_eq!(indexer.sync_from_log().await.unwrap(), 0);
        assert_eq!(embedder.texts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn embedding_failure_propagates_and_adds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (indexer, _) = indexer(&dir, Arc::new(FailingEmbedder), 8);
        let err = indexer.upsert_new(&[chunk("d", 0)]).await.unwrap_err();
        assert!(err.to_string().contains("offline"));
        assert!(indexer.index().is_empty().await.unwrap());
    }
}
