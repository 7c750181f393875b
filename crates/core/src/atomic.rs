//! Atomic JSON file writes: serialize, write a sibling temp file, fsync, rename.

use crate::error::StorageError;
use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Whether an existing file at the target path may be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    Overwrite,
    CreateNew,
}

/// Reads and deserializes a JSON file.
///
/// Returns `Ok(None)` when the file is missing or blank.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| StorageError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Serializes `value` as pretty JSON and atomically places it at `path`.
pub(crate) async fn write_json<T: Serialize>(
    path: &Path,
    value: &T,
    mode: WriteMode,
) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let json = serde_json::to_vec_pretty(value).map_err(StorageError::Serialize)?;

    if mode == WriteMode::CreateNew {
        // Claim the name first so a concurrent writer sees it as taken. An
        // empty reservation reads as `None` until the rename fills it.
        reserve(path).await?;
        let result = replace(path, &json).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(path).await;
        }
        return result;
    }
    replace(path, &json).await
}

async fn reserve(path: &Path) -> Result<(), StorageError> {
    match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(StorageError::AlreadyExists(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Writes `json` to a sibling temp file, syncs it, and renames it over `path`.
async fn replace(path: &Path, json: &[u8]) -> Result<(), StorageError> {
    let tmp_path = temp_path(path);
    let mut tmp_file = tokio::fs::File::create(&tmp_path).await?;
    tmp_file.write_all(json).await?;
    tmp_file.sync_all().await?;
    drop(tmp_file);

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "record".to_string());
    path.with_file_name(format!(".{file_name}.tmp"))
}
