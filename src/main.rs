//! # InsightOps CLI (`insightops`)
//!
//! ## Usage
//!
//! ```bash
//! insightops --config ./config/insightops.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `insightops init` | Create data/queue directories and the vector schema |
//! | `insightops ingest <PATH>...` | Ingest files or directories |
//! | `insightops watch` | Process the ingest queue as files arrive |
//! | `insightops reindex` | Embed every logged chunk missing from the index |
//! | `insightops search "<query>"` | Semantic search |
//! | `insightops files` | Files present in the index |
//! | `insightops stats` | Index counts |
//! | `insightops serve` | Start the HTTP API |

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use insightops::app::{self, App};
use insightops::config::{self, Config};
use insightops::ingest::ProcessStatus;
use insightops::server::{self, AppState};
use insightops::watcher::QueueWatcher;

const DEFAULT_CONFIG: &str = "./config/insightops.toml";

#[derive(Parser)]
#[command(
    name = "insightops",
    about = "InsightOps: local document ingestion and semantic search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults to `./config/insightops.toml`;
    /// built-in defaults apply when that file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data, queue, and processed directories and the vector schema.
    Init,

    /// Ingest files. Directories are walked recursively.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Leave files where they are instead of moving them to the processed directory.
        #[arg(long)]
        keep: bool,
    },

    /// Watch the ingest queue and process files as they arrive.
    Watch,

    /// Embed every chunk in the chunk log that the index does not hold yet.
    Reindex,

    /// Semantic search over indexed chunks.
    Search {
        query: String,

        /// Number of results (defaults to `retrieval.default_k`).
        #[arg(short, long)]
        k: Option<usize>,

        /// Print the full formatted chunk instead of the snippet.
        #[arg(long)]
        full: bool,
    },

    /// List files present in the vector index.
    Files,

    /// Show vector and file counts.
    Stats,

    /// Start the HTTP API.
    Serve {
        /// Also watch the ingest queue while serving.
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let (config_path, required) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };
    let mut cfg = config::load_config(&config_path, required)?;

    match cli.command {
        Commands::Init => {
            app::init(&cfg).await?;
            println!("Initialized:");
            println!("  data:      {}", cfg.paths.data_dir.display());
            println!("  queue:     {}", cfg.paths.ingest_dir.display());
            println!("  processed: {}", cfg.paths.processed_dir.display());
        }
        Commands::Ingest { paths, keep } => {
            if keep {
                cfg.watcher.move_processed = false;
            }
            let app = App::open(cfg).await?;
            let result = run_ingest(&app, &paths).await;
            app.close().await;
            result?;
        }
        Commands::Watch => {
            let app = App::open(cfg).await?;
            let watcher = QueueWatcher::new(
                app.config.paths.ingest_dir.clone(),
                Duration::from_millis(app.config.watcher.settle_ms),
                app.pipeline.clone(),
            );
            let result = watcher.run(stopped(shutdown_channel())).await;
            app.close().await;
            result?;
        }
        Commands::Reindex => {
            let app = App::open(cfg).await?;
            let result = app.indexer.sync_from_log().await;
            app.close().await;
            println!("reindex: {} vectors added", result?);
        }
        Commands::Search { query, k, full } => {
            let app = App::open(cfg).await?;
            let result = app.query.search(&query, k.unwrap_or(0)).await;
            app.close().await;
            print_results(&result?, full);
        }
        Commands::Files => {
            let app = App::open(cfg).await?;
            let result = app.query.list_indexed_files().await;
            app.close().await;
            let files = result?;
            if files.is_empty() {
                println!("No indexed files.");
            }
            for f in files {
                println!("{:<40} {:>6} chunks  {}", f.file_name, f.chunks, f.content_hash);
            }
        }
        Commands::Stats => {
            let app = App::open(cfg).await?;
            let result = app.query.get_index_stats().await;
            app.close().await;
            let stats = result?;
            println!("InsightOps Index Stats");
            println!("======================");
            println!();
            println!("  Vectors: {}", stats.total_chunks);
            println!("  Files:   {}", stats.total_files);
        }
        Commands::Serve { watch } => {
            let app = App::open(cfg).await?;
            let stop = shutdown_channel();

            let watcher_task = if watch {
                let watcher = QueueWatcher::new(
                    app.config.paths.ingest_dir.clone(),
                    Duration::from_millis(app.config.watcher.settle_ms),
                    app.pipeline.clone(),
                );
                let stop = stopped(stop.clone());
                Some(tokio::spawn(async move { watcher.run(stop).await }))
            } else {
                None
            };

            let state = AppState {
                pipeline: app.pipeline.clone(),
                query: app.query.clone(),
                upload_dir: app.config.paths.ingest_dir.clone(),
            };
            let bind = app.config.server.bind.clone();
            let served = server::run_server(&bind, state, stopped(stop)).await;

            if let Some(task) = watcher_task {
                match task.await {
                    Ok(Err(e)) => error!(error = %e, "watcher stopped with an error"),
                    Err(e) => error!(error = %e, "watcher task failed"),
                    Ok(Ok(())) => {}
                }
            }
            app.close().await;
            served?;
        }
    }

    Ok(())
}

async fn run_ingest(app: &App, paths: &[PathBuf]) -> Result<()> {
    let files = collect_files(paths);
    if files.is_empty() {
        println!("No files to ingest.");
        return Ok(());
    }

    let (mut ok, mut skipped, mut failed) = (0usize, 0usize, 0usize);
    for path in &files {
        match app.pipeline.process_file(path).await {
            Ok(outcome) => {
                match outcome.status {
                    ProcessStatus::Ok => {
                        ok += 1;
                        println!(
                            "ok       {}  chunks={} vectors={}",
                            outcome.filename,
                            outcome.chunks.unwrap_or(0),
                            outcome.vectors_added.unwrap_or(0)
                        );
                    }
                    ProcessStatus::Skipped => {
                        skipped += 1;
                        println!("skipped  {}", outcome.filename);
                    }
                }
                if let (ProcessStatus::Ok, Some(note)) = (outcome.status, &outcome.note) {
                    println!("         note: {}", note);
                }
            }
            Err(e) => {
                failed += 1;
                error!(path = %path.display(), error = %e, "ingest failed");
            }
        }
    }

    println!();
    println!("ingested: {}  skipped: {}  failed: {}", ok, skipped, failed);
    if failed > 0 {
        bail!("{} of {} files failed to ingest", failed, files.len());
    }
    Ok(())
}

/// Expand directories into the files below them; hidden entries are skipped.
fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = walkdir::WalkDir::new(path)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .collect();
            found.sort();
            files.extend(found);
        } else if path.exists() {
            files.push(path.clone());
        } else {
            warn!(path = %path.display(), "no such file");
        }
    }
    files
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

fn print_results(results: &[insightops_core::models::QueryResult], full: bool) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, r) in results.iter().enumerate() {
        let distance = r
            .distance
            .map(|d| format!("{:.4}", d))
            .unwrap_or_else(|| "n/a".to_string());
        println!("{}. [{}] {} (chunk {})", i + 1, distance, r.file_name, r.chunk_id);
        let body = if full { &r.full_text } else { &r.snippet };
        for line in body.lines() {
            println!("    {}", line);
        }
        println!();
    }
}

/// A channel flipped to `true` on Ctrl-C.
fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(true);
        }
    });
    rx
}

fn stopped(mut rx: watch::Receiver<bool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let _ = rx.wait_for(|stop| *stop).await;
    }
}
