//! # InsightOps
//!
//! Local document ingestion and semantic search.
//!
//! Files dropped into an ingest queue (or uploaded over HTTP) are hashed,
//! their text is extracted and cleaned, split into fixed-size word chunks,
//! embedded, and stored in a vector index. Queries are embedded the same
//! way and answered with the closest chunks, ranked by distance and
//! stripped of near-duplicate snippets.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────────┐   ┌──────────────┐
//! │ ingest queue │──▶│ hash → extract →   │──▶│ metadata.json│
//! │ / upload     │   │ clean → chunk      │   │ chunks.json  │
//! └──────────────┘   └─────────┬──────────┘   └──────────────┘
//!                              ▼
//!                      ┌──────────────┐       ┌──────────────┐
//!                      │ VectorIndexer│──────▶│vectors.sqlite│
//!                      └──────────────┘       └──────┬───────┘
//!                                                    ▼
//!                      ┌──────────┐           ┌─────────────┐
//!                      │ CLI/HTTP │◀──────────│ QueryEngine │
//!                      └──────────┘           └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`app`] | Service construction and teardown |
//! | [`config`] | TOML configuration parsing |
//! | [`hashing`] | SHA-256 content identity |
//! | [`metadata`] | File records, idempotent by hash |
//! | [`chunk_log`] | Append-only chunk log |
//! | [`extract`] | Text extraction for `.txt`, `.pdf`, `.pptx` |
//! | [`embedding`] | Embedding providers |
//! | [`sqlite_index`] | SQLite vector index |
//! | [`indexer`] | Embed-once vector indexing |
//! | [`ingest`] | Single-file ingestion pipeline |
//! | [`search`] | Query engine |
//! | [`watcher`] | Ingest-queue watcher |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod app;
pub mod chunk_log;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod hashing;
pub mod indexer;
pub mod ingest;
pub mod json_store;
pub mod metadata;
pub mod migrate;
pub mod search;
pub mod server;
pub mod sqlite_index;
pub mod watcher;
