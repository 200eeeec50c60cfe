//! HTTP API over the ingestion pipeline and query engine.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/search?q=&k=` | Semantic search |
//! | `POST` | `/upload?filename=` | Raw file body; saved to the ingest queue and processed |
//! | `GET`  | `/files` | Files present in the vector index |
//! | `GET`  | `/stats` | Vector and file counts |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `embeddings_disabled` (400),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front ends
//! on other ports can call the API.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use insightops_core::models::{IndexStats, IndexedFile, QueryResult};

use crate::error::{EmbeddingsDisabled, IngestError};
use crate::extract::FileKind;
use crate::ingest::{Pipeline, ProcessOutcome, ALREADY_INDEXED};
use crate::search::QueryEngine;

/// Largest accepted upload body.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Shared state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub query: Arc<QueryEngine>,
    /// Directory uploads are written into before processing.
    pub upload_dir: PathBuf,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", get(handle_search))
        .route("/upload", post(handle_upload))
        .route("/files", get(handle_files))
        .route("/stats", get(handle_stats))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Bind `bind_addr` and serve until `shutdown` resolves.
pub async fn run_server<F>(bind_addr: &str, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "HTTP server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Map query-side failures; a disabled embedder is the caller's problem.
fn classify_query_error(err: anyhow::Error) -> AppError {
    let msg = err.to_string();
    if err.chain().any(|cause| cause.is::<EmbeddingsDisabled>()) {
        let mut e = bad_request(msg);
        e.code = "embeddings_disabled".to_string();
        e
    } else {
        internal(msg)
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match &err {
            IngestError::NotFound(_) => not_found(err.to_string()),
            _ => internal(err.to_string()),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /search ============

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    query: String,
    count: usize,
    results: Vec<QueryResult>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = params.q.trim().to_string();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let results = state
        .query
        .search(&query, params.k.unwrap_or(0))
        .await
        .map_err(classify_query_error)?;

    Ok(Json(SearchResponse {
        query,
        count: results.len(),
        results,
    }))
}

// ============ POST /upload ============

#[derive(Deserialize)]
struct UploadParams {
    filename: String,
}

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    #[serde(flatten)]
    outcome: ProcessOutcome,
}

async fn handle_upload(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<UploadResponse>, AppError> {
    // keep only the final component so uploads cannot escape the queue dir
    let file_name = std::path::Path::new(&params.filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| bad_request("filename must not be empty"))?;

    let dest = state.upload_dir.join(&file_name);
    if !FileKind::from_path(&dest).is_supported() {
        return Err(bad_request(format!(
            "unsupported file type: {} (allowed: .pdf, .pptx, .txt)",
            file_name
        )));
    }

    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(|e| internal(format!("failed to prepare upload dir: {}", e)))?;
    tokio::fs::write(&dest, &body)
        .await
        .map_err(|e| internal(format!("failed to save upload: {}", e)))?;

    let outcome = state.pipeline.process_file(&dest).await.map_err(|e| {
        warn!(file = %file_name, error = %e, "upload processing failed");
        AppError::from(e)
    })?;

    let message = if outcome.is_skipped() {
        ALREADY_INDEXED.to_string()
    } else {
        format!("Uploaded and processed {}.", outcome.filename)
    };
    Ok(Json(UploadResponse { message, outcome }))
}

// ============ GET /files, GET /stats ============

#[derive(Serialize)]
struct FilesResponse {
    count: usize,
    files: Vec<IndexedFile>,
}

async fn handle_files(State(state): State<AppState>) -> Result<Json<FilesResponse>, AppError> {
    let files = state
        .query
        .list_indexed_files()
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(FilesResponse {
        count: files.len(),
        files,
    }))
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<IndexStats>, AppError> {
    state
        .query
        .get_index_stats()
        .await
        .map(Json)
        .map_err(|e| internal(e.to_string()))
}
