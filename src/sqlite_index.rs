//! SQLite-backed [`VectorIndex`] implementation.
//!
//! Vectors are stored as little-endian f32 BLOBs in the `vectors` table
//! next to their chunk metadata and text. Nearest-neighbour search is a
//! brute-force cosine-distance scan over every row.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use insightops_core::embedding::{blob_to_vec, compare_distance, cosine_distance, vec_to_blob};
use insightops_core::index::VectorIndex;
use insightops_core::models::{ChunkMetadata, Neighbor, VectorEntry};

pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_metadata(row: &sqlx::sqlite::SqliteRow) -> ChunkMetadata {
    let chunk_id: i64 = row.get("chunk_id");
    ChunkMetadata {
        file_name: row.get("file_name"),
        content_hash: row.get("content_hash"),
        chunk_id: chunk_id as u32,
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn ids(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT id FROM vectors")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get::<String, _>("id")).collect())
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn upsert(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut added = 0usize;

        for entry in entries {
            let result = sqlx::query(
                r#"
                INSERT INTO vectors (id, file_name, content_hash, chunk_id, text,
                                     embedding, dims, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(&entry.id)
            .bind(&entry.metadata.file_name)
            .bind(&entry.metadata.content_hash)
            .bind(entry.metadata.chunk_id as i64)
            .bind(&entry.text)
            .bind(vec_to_blob(&entry.embedding))
            .bind(entry.embedding.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            added += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(added)
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, file_name, content_hash, chunk_id, text, embedding FROM vectors",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<Neighbor> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                Neighbor {
                    id: row.get("id"),
                    distance: cosine_distance(query, &blob_to_vec(&blob)),
                    metadata: row_metadata(row),
                    text: row.get("text"),
                }
            })
            .collect();

        hits.sort_by(|a, b| compare_distance(a.distance, b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    async fn metadata(&self) -> Result<Vec<ChunkMetadata>> {
        let rows = sqlx::query("SELECT file_name, content_hash, chunk_id FROM vectors")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_metadata).collect())
    }
}
