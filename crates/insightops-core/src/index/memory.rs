//! In-memory [`VectorIndex`] implementation for tests and embedding-free use.
//!
//! Uses a `Vec` plus an id lookup behind `std::sync::RwLock`. Nearest
//! neighbour search is a brute-force cosine-distance scan.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::{compare_distance, cosine_distance};
use crate::models::{ChunkMetadata, Neighbor, VectorEntry};

use super::VectorIndex;

#[derive(Default)]
struct Entries {
    rows: Vec<VectorEntry>,
    positions: HashMap<String, usize>,
}

/// In-memory vector index.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    entries: RwLock<Entries>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn ids(&self) -> Result<HashSet<String>> {
        let entries = self.entries.read().unwrap();
        Ok(entries.positions.keys().cloned().collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().unwrap().rows.len())
    }

    async fn upsert(&self, new_entries: &[VectorEntry]) -> Result<usize> {
        let mut entries = self.entries.write().unwrap();
        let mut added = 0;
        for entry in new_entries {
            if entries.positions.contains_key(&entry.id) {
                continue;
            }
            let pos = entries.rows.len();
            entries.positions.insert(entry.id.clone(), pos);
            entries.rows.push(entry.clone());
            added += 1;
        }
        Ok(added)
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let entries = self.entries.read().unwrap();
        let mut hits: Vec<Neighbor> = entries
            .rows
            .iter()
            .map(|e| Neighbor {
                id: e.id.clone(),
                distance: cosine_distance(query, &e.embedding),
                metadata: e.metadata.clone(),
                text: e.text.clone(),
            })
            .collect();
        hits.sort_by(|a, b| compare_distance(a.distance, b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    async fn metadata(&self) -> Result<Vec<ChunkMetadata>> {
        let entries = self.entries.read().unwrap();
        Ok(entries.rows.iter().map(|e| e.metadata.clone()).collect())
    }
}
