//! Query engine: embed a query, fetch nearest chunks, present them.
//!
//! Formatting, ranking, and snippet dedup are pure functions in
//! [`insightops_core::search`]; this module wires them to the vector
//! index and the embedding provider.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use insightops_core::models::{IndexStats, IndexedFile, QueryResult};
use insightops_core::search::{aggregate_files, index_stats, present, FormatOptions};

use crate::indexer::VectorIndexer;

pub struct QueryEngine {
    indexer: Arc<VectorIndexer>,
    default_k: usize,
    format: FormatOptions,
}

impl QueryEngine {
    pub fn new(indexer: Arc<VectorIndexer>, default_k: usize, format: FormatOptions) -> Self {
        Self {
            indexer,
            default_k: default_k.max(1),
            format,
        }
    }

    /// Up to `k` results, closest first, with duplicate snippets removed.
    /// A `k` of zero means the configured default.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<QueryResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let k = if k == 0 { self.default_k } else { k };

        let built = self.indexer.ensure_built().await?;
        if built > 0 {
            debug!(vectors = built, "index built from chunk log");
        }

        let query_vec = self.indexer.embedder().embed_query(query).await?;
        let hits = self.indexer.index().nearest(&query_vec, k).await?;
        debug!(query, k, hits = hits.len(), "nearest neighbours fetched");

        Ok(present(hits, &self.format))
    }

    /// Every distinct `(file, hash)` pair in the index with its chunk count.
    pub async fn list_indexed_files(&self) -> Result<Vec<IndexedFile>> {
        let metadata = self.indexer.index().metadata().await?;
        Ok(aggregate_files(&metadata))
    }

    pub async fn get_index_stats(&self) -> Result<IndexStats> {
        let total = self.indexer.index().count().await?;
        let files = self.list_indexed_files().await?;
        Ok(index_stats(total, files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_log::ChunkLog;
    use async_trait::async_trait;
    use insightops_core::embedding::EmbeddingProvider;
    use insightops_core::index::VectorIndex;
    use insightops_core::models::{ChunkMetadata, Neighbor, VectorEntry};
    use std::collections::HashSet;

    struct UnitEmbedder;

    #[async_trait]
    impl EmbeddingProvider for UnitEmbedder {
        fn model_name(&self) -> &str {
            "unit"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    /// Returns canned neighbours regardless of the query.
    struct FixedIndex(Vec<Neighbor>);

    #[async_trait]
    impl VectorIndex for FixedIndex {
        async fn ids(&self) -> Result<HashSet<String>> {
            Ok(self.0.iter().map(|n| n.id.clone()).collect())
        }
        async fn count(&self) -> Result<usize> {
            Ok(self.0.len())
        }
        async fn upsert(&self, _entries: &[VectorEntry]) -> Result<usize> {
            Ok(0)
        }
        async fn nearest(&self, _query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
        async fn metadata(&self) -> Result<Vec<ChunkMetadata>> {
            Ok(self.0.iter().map(|n| n.metadata.clone()).collect())
        }
    }

    fn neighbor(file: &str, chunk_id: u32, distance: Option<f32>, text: &str) -> Neighbor {
        Neighbor {
            id: format!("{}:{}", file, chunk_id),
            distance,
            metadata: ChunkMetadata {
                file_name: file.to_string(),
                content_hash: format!("hash-{}", file),
                chunk_id,
            },
            text: text.to_string(),
        }
    }

    fn engine(dir: &tempfile::TempDir, hits: Vec<Neighbor>) -> QueryEngine {
        let indexer = VectorIndexer::new(
            Arc::new(FixedIndex(hits)),
            Arc::new(UnitEmbedder),
            Arc::new(ChunkLog::new(dir.path().join("chunks.json"))),
            8,
        );
        QueryEngine::new(Arc::new(indexer), 5, FormatOptions::default())
    }

    #[tokio::test]
    async fn results_are_ranked_by_distance_missing_last() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(
            &dir,
            vec![
                neighbor("a.txt", 0, Some(0.8), "alpha"),
                neighbor("b.txt", 0, Some(0.1), "bravo"),
                neighbor("c.txt", 0, None, "charlie"),
                neighbor("d.txt", 0, Some(0.3), "delta"),
            ],
        );

        let results = engine.search("anything", 4).await.unwrap();
        let distances: Vec<Option<f32>> = results.iter().map(|r| r.distance).collect();
        assert_eq!(distances, vec![Some(0.1), Some(0.3), Some(0.8), None]);
        assert_eq!(results[0].file_name, "b.txt");
    }

    #[tokio::test]
    async fn duplicate_snippets_keep_the_closest() {
        let dir = tempfile::tempdir().unwrap();
        let shared = "x".repeat(130);
        let engine = engine(
            &dir,
            vec![
                neighbor("far.txt", 0, Some(0.9), &format!("{} far tail", shared)),
                neighbor("near.txt", 0, Some(0.2), &format!("{} near tail", shared)),
                neighbor("other.txt", 0, Some(0.5), "something else"),
            ],
        );

        let results = engine.search("q", 5).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].file_name, "near.txt");
        assert_eq!(results[1].file_name, "other.txt");
    }

    #[tokio::test]
    async fn empty_query_and_zero_k() {
        let dir = tempfile::tempdir().unwrap();
        let hits: Vec<Neighbor> = (0..7)
            .map(|i| neighbor(&format!("f{}.txt", i), 0, Some(i as f32 / 10.0), &format!("text {}", i)))
            .collect();
        let engine = engine(&dir, hits);

        assert!(engine.search("   ", 3).await.unwrap().is_empty());
        assert_eq!(engine.search("q", 0).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn files_and_stats_aggregate_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(
            &dir,
            vec![
                neighbor("b.txt", 0, None, "b0"),
                neighbor("a.txt", 0, None, "a0"),
                neighbor("a.txt", 1, None, "a1"),
            ],
        );

        let files = engine.list_indexed_files().await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].file_name, "a.txt");
        assert_eq!(files[0].chunks, 2);

        let stats = engine.get_index_stats().await.unwrap();
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.total_files, 2);
    }
}
