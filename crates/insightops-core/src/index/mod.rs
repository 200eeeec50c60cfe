//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the capability boundary between the
//! indexer/query engine and whatever actually stores vectors. The app
//! crate ships a SQLite implementation; [`memory::InMemoryVectorIndex`]
//! serves tests and embedding experiments.
//!
//! Entries are add-only. An id that is already present is never
//! overwritten, so upserting the same entry twice is harmless.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`ids`](VectorIndex::ids) | Every id currently stored |
//! | [`count`](VectorIndex::count) | Number of stored vectors |
//! | [`upsert`](VectorIndex::upsert) | Add entries whose id is not yet present |
//! | [`nearest`](VectorIndex::nearest) | `k` closest entries to a query vector |
//! | [`metadata`](VectorIndex::metadata) | Metadata of every stored entry |

pub mod memory;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChunkMetadata, Neighbor, VectorEntry};

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// All ids currently present in the index.
    async fn ids(&self) -> Result<HashSet<String>>;

    /// Total number of stored vectors.
    async fn count(&self) -> Result<usize>;

    /// Insert entries whose ids are not yet present. Returns how many were
    /// actually added.
    async fn upsert(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// The `k` entries closest to `query`, closest first.
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// Metadata for every stored entry, in no particular order.
    async fn metadata(&self) -> Result<Vec<ChunkMetadata>>;

    /// Whether the index holds no vectors.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.count().await? == 0)
    }
}
