//! Ingest-queue watcher.
//!
//! Bridges notify's synchronous callback into tokio: the callback
//! `blocking_send`s each event into an mpsc channel, and an async loop
//! drains it. Files are handled one at a time, each after a settle delay
//! so a file still being written is not read half-way.
//!
//! Files already sitting in the queue when the watcher starts are
//! processed first, in name order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::ingest::Pipeline;

pub struct QueueWatcher {
    queue_dir: PathBuf,
    settle: Duration,
    pipeline: Arc<Pipeline>,
}

impl QueueWatcher {
    pub fn new(queue_dir: impl Into<PathBuf>, settle: Duration, pipeline: Arc<Pipeline>) -> Self {
        Self {
            queue_dir: queue_dir.into(),
            settle,
            pipeline,
        }
    }

    /// Files currently in the queue directory, sorted by path.
    pub fn pending_files(&self) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&self.queue_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| !is_hidden(path))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Process everything already queued. Returns how many files were handled.
    pub async fn drain_existing(&self) -> Result<usize> {
        let files = self.pending_files()?;
        for path in &files {
            self.handle(path).await;
        }
        Ok(files.len())
    }

    /// Drain the queue, then process new arrivals until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::fs::create_dir_all(&self.queue_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.queue_dir.display()))?;

        let (tx, mut rx) = mpsc::channel::<notify::Result<Event>>(256);
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                // notify's own thread; a full or closed channel drops the event
                let _ = tx.blocking_send(res);
            },
            notify::Config::default(),
        )
        .context("Failed to initialize file watcher")?;
        watcher
            .watch(&self.queue_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", self.queue_dir.display()))?;

        let drained = self.drain_existing().await?;
        info!(
            dir = %self.queue_dir.display(),
            drained,
            "watching ingest queue"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("watcher shutting down");
                    break;
                }
                event = rx.recv() => {
                    let Some(event) = event else {
                        info!("watcher channel closed");
                        break;
                    };
                    match event {
                        Ok(event) => {
                            for path in arrived_files(&event) {
                                self.handle(&path).await;
                            }
                        }
                        Err(e) => warn!(error = %e, "watch error"),
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle(&self, path: &Path) {
        tokio::time::sleep(self.settle).await;
        if !path.is_file() {
            debug!(path = %path.display(), "queued file gone before processing");
            return;
        }
        match self.pipeline.process_file(path).await {
            Ok(outcome) => debug!(file = %outcome.filename, status = ?outcome.status, "queue item done"),
            Err(e) => error!(path = %path.display(), error = %e, "failed to process queued file"),
        }
    }
}

/// Paths a notify event reports as newly present files.
fn arrived_files(event: &Event) -> Vec<PathBuf> {
    let candidates: Vec<&PathBuf> = match event.kind {
        EventKind::Create(_) => event.paths.iter().collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.iter().collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event.paths.iter().skip(1).collect(),
        _ => Vec::new(),
    };
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|p| !is_hidden(p) && seen.insert((*p).clone()))
        .cloned()
        .collect()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::CreateKind;

    #[test]
    fn create_and_rename_to_are_arrivals() {
        let created = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/q/a.txt"));
        assert_eq!(arrived_files(&created), vec![PathBuf::from("/q/a.txt")]);

        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/tmp/upload.part"))
            .add_path(PathBuf::from("/q/b.pdf"));
        assert_eq!(arrived_files(&renamed), vec![PathBuf::from("/q/b.pdf")]);
    }

    #[test]
    fn removals_and_hidden_files_are_ignored() {
        let removed = Event::new(EventKind::Remove(notify::event::RemoveKind::File))
            .add_path(PathBuf::from("/q/a.txt"));
        assert!(arrived_files(&removed).is_empty());

        let hidden = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/q/.a.txt.swp"));
        assert!(arrived_files(&hidden).is_empty());
    }
}
