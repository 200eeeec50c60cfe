//! Whole-collection JSON persistence shared by the metadata store and the
//! chunk log.
//!
//! A collection is a single pretty-printed JSON array. Reads never fail:
//! a missing, empty, unreadable, or unparseable file is treated as an empty
//! collection and logged. Writes go to a sibling temporary file that is
//! then renamed over the target, so readers see either the old or the new
//! collection, never a half-written one.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::StoreError;

/// Load a JSON array from `path`, treating anything unusable as empty.
pub async fn load_collection<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable store, treating as empty");
            return Vec::new();
        }
    };

    if content.trim().is_empty() {
        return Vec::new();
    }

    match serde_json::from_str(&content) {
        Ok(items) => items,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt store, resetting to empty");
            Vec::new()
        }
    }
}

/// Atomically replace the collection at `path` with `items`.
pub async fn write_collection<T: Serialize>(path: &Path, items: &[T]) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(items)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(parent, source))?;
        }
    }

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, &json)
        .await
        .map_err(|source| io_error(&tmp, source))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| io_error(path, source))?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let items: Vec<u32> = load_collection(&dir.path().join("nope.json")).await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "[1, 2, ").unwrap();
        let items: Vec<u32> = load_collection(&path).await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn write_then_load_and_no_temp_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("items.json");
        write_collection(&path, &[1u32, 2, 3]).await.unwrap();

        let items: Vec<u32> = load_collection(&path).await;
        assert_eq!(items, vec![1, 2, 3]);
        assert!(!dir.path().join("nested").join("items.json.tmp").exists());
    }
}
