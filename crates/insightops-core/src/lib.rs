//! # InsightOps Core
//!
//! Shared, I/O-free logic for InsightOps: data models, text cleaning and
//! word-window chunking, the embedding and vector-index traits, an
//! in-memory index, and the query-result formatting and ranking rules.
//!
//! This crate contains no tokio runtime, sqlx, filesystem or network
//! dependencies. Everything that touches disk or a model lives in the
//! `insightops` app crate.

pub mod embedding;
pub mod index;
pub mod models;
pub mod normalize;
pub mod search;
