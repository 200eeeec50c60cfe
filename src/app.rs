//! Process-wide services, built once at startup and closed on shutdown.
//!
//! [`App::open`] wires the stores, the embedding provider, the SQLite
//! vector index, the indexer, the ingestion pipeline, and the query
//! engine together. Everything is handed out by `Arc`, so the watcher and
//! the HTTP server share one instance of each.

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use insightops_core::embedding::EmbeddingProvider;
use insightops_core::index::VectorIndex;

use crate::chunk_log::ChunkLog;
use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::indexer::VectorIndexer;
use crate::ingest::{Pipeline, PipelineSettings};
use crate::metadata::MetadataStore;
use crate::migrate;
use crate::search::QueryEngine;
use crate::sqlite_index::SqliteVectorIndex;

pub struct App {
    pub config: Config,
    pub metadata: Arc<MetadataStore>,
    pub chunk_log: Arc<ChunkLog>,
    pub indexer: Arc<VectorIndexer>,
    pub pipeline: Arc<Pipeline>,
    pub query: Arc<QueryEngine>,
    pool: Option<SqlitePool>,
}

impl App {
    /// Open the on-disk stores and the configured embedding provider.
    pub async fn open(config: Config) -> Result<Self> {
        let pool = db::connect(&config.paths.vectors_path()).await?;
        migrate::run_migrations(&pool).await?;
        let index: Arc<dyn VectorIndex> = Arc::new(SqliteVectorIndex::new(pool.clone()));
        let embedder = create_provider(&config.embedding)?;
        info!(
            provider = %config.embedding.provider,
            model = embedder.model_name(),
            data_dir = %config.paths.data_dir.display(),
            "services ready"
        );

        let mut app = Self::with_services(config, index, embedder);
        app.pool = Some(pool);
        Ok(app)
    }

    /// Assemble the services around an explicit index and embedder.
    pub fn with_services(
        config: Config,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let metadata = Arc::new(MetadataStore::new(config.paths.metadata_path()));
        let chunk_log = Arc::new(ChunkLog::new(config.paths.chunks_path()));
        let indexer = Arc::new(VectorIndexer::new(
            index,
            embedder,
            chunk_log.clone(),
            config.embedding.batch_size,
        ));
        let pipeline = Arc::new(Pipeline::new(
            metadata.clone(),
            chunk_log.clone(),
            indexer.clone(),
            PipelineSettings {
                chunk_size: config.chunking.chunk_size,
                processed_dir: config
                    .watcher
                    .move_processed
                    .then(|| config.paths.processed_dir.clone()),
            },
        ));
        let query = Arc::new(QueryEngine::new(
            indexer.clone(),
            config.retrieval.default_k,
            config.retrieval.format_options(),
        ));

        Self {
            config,
            metadata,
            chunk_log,
            indexer,
            pipeline,
            query,
            pool: None,
        }
    }

    /// Release the database pool.
    pub async fn close(self) {
        if let Some(pool) = self.pool {
            pool.close().await;
        }
    }
}

/// Create the data, queue, and processed directories plus the schema.
pub async fn init(config: &Config) -> Result<()> {
    for dir in [
        &config.paths.data_dir,
        &config.paths.ingest_dir,
        &config.paths.processed_dir,
    ] {
        tokio::fs::create_dir_all(dir).await?;
    }
    let pool = db::connect(&config.paths.vectors_path()).await?;
    migrate::run_migrations(&pool).await?;
    pool.close().await;
    Ok(())
}
