//! File placement helpers: atomic writes and cross-device-safe moves.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

/// Serialize `value` as pretty JSON into `path` via a sibling temp file and rename.
/// Readers never observe a half-written file.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Create {}", parent.display()))?;
    }
    let mut body = serde_json::to_vec_pretty(value).context("Serialize JSON")?;
    body.push(b'\n');

    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, &body)
        .await
        .with_context(|| format!("Write {}", tmp.display()))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        tokio::fs::remove_file(&tmp).await.ok();
        return Err(e).with_context(|| format!("Rename {} -> {}", tmp.display(), path.display()));
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Move `src` to `dst`, replacing any existing file. Falls back to copy+remove
/// when rename fails (e.g. across filesystems).
pub async fn atomic_move(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Create {}", parent.display()))?;
    }
    match tokio::fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tokio::fs::copy(src, dst).await.with_context(|| {
                format!("Copy {} -> {} after rename error: {}", src.display(), dst.display(), e)
            })?;
            tokio::fs::remove_file(src)
                .await
                .with_context(|| format!("Remove {} after copy", src.display()))?;
            Ok(())
        }
    }
}

/// Move `src` into directory `dir`, keeping its file name. Returns the new path.
pub async fn move_into(src: &Path, dir: &Path) -> Result<PathBuf> {
    let name = src
        .file_name()
        .with_context(|| format!("{} has no file name", src.display()))?;
    let dst = dir.join(name);
    atomic_move(src, &dst).await?;
    Ok(dst)
}
