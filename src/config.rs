//! TOML configuration parsing and validation.
//!
//! Every section is optional; missing keys fall back to the defaults below.
//!
//! ```toml
//! [paths]
//! data_dir = "./data"
//! ingest_dir = "./ingest_queue"
//! processed_dir = "./processed"
//!
//! [chunking]
//! chunk_size = 300
//!
//! [retrieval]
//! default_k = 5
//! snippet_chars = 400
//! dedup_prefix_chars = 120
//!
//! [embedding]
//! provider = "local"            # disabled | openai | ollama | local
//! model = "all-minilm-l6-v2"
//! batch_size = 64
//!
//! [server]
//! bind = "127.0.0.1:8000"
//!
//! [watcher]
//! settle_ms = 200
//! move_processed = true
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use insightops_core::search::FormatOptions;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_ingest_dir")]
    pub ingest_dir: PathBuf,
    #[serde(default = "default_processed_dir")]
    pub processed_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ingest_dir: default_ingest_dir(),
            processed_dir: default_processed_dir(),
        }
    }
}

impl PathsConfig {
    /// JSON array of [`FileRecord`](insightops_core::models::FileRecord)s.
    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join("metadata.json")
    }

    /// JSON array of [`Chunk`](insightops_core::models::Chunk)s.
    pub fn chunks_path(&self) -> PathBuf {
        self.data_dir.join("chunks.json")
    }

    /// SQLite database holding the vector index.
    pub fn vectors_path(&self) -> PathBuf {
        self.data_dir.join("vectors.sqlite")
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_ingest_dir() -> PathBuf {
    PathBuf::from("./ingest_queue")
}
fn default_processed_dir() -> PathBuf {
    PathBuf::from("./processed")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Words per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_chunk_size() -> usize {
    insightops_core::normalize::DEFAULT_CHUNK_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    #[serde(default = "default_dedup_prefix_chars")]
    pub dedup_prefix_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            snippet_chars: default_snippet_chars(),
            dedup_prefix_chars: default_dedup_prefix_chars(),
        }
    }
}

impl RetrievalConfig {
    pub fn format_options(&self) -> FormatOptions {
        FormatOptions {
            snippet_chars: self.snippet_chars,
            dedup_prefix_chars: self.dedup_prefix_chars,
        }
    }
}

fn default_k() -> usize {
    5
}
fn default_snippet_chars() -> usize {
    400
}
fn default_dedup_prefix_chars() -> usize {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatcherConfig {
    /// Delay between a file appearing and reading it.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Move files into `processed_dir` once handled.
    #[serde(default = "default_move_processed")]
    pub move_processed: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            move_processed: default_move_processed(),
        }
    }
}

fn default_settle_ms() -> u64 {
    200
}
fn default_move_processed() -> bool {
    true
}

/// Parse a config file. A missing file yields defaults unless `required`.
pub fn load_config(path: &Path, required: bool) -> Result<Config> {
    if !path.exists() && !required {
        let config = Config::default();
        validate(&config)?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate config from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }

    if config.retrieval.default_k < 1 {
        anyhow::bail!("retrieval.default_k must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    Ok(())
}
