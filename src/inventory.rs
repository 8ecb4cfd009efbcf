//! Where a video currently sits in the pipeline.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};

use crate::pipeline::PipelineDirs;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SongStatus {
    pub video_id: String,
    pub pending: bool,
    pub processed: bool,
    pub failed: bool,
    pub generated: bool,
}

impl SongStatus {
    pub fn is_known(&self) -> bool {
        self.pending || self.processed || self.failed || self.generated
    }

    /// One-word summary for tables.
    pub fn label(&self) -> &'static str {
        match (self.generated, self.pending, self.failed, self.processed) {
            (_, true, _, _) => "pending",
            (true, _, _, _) => "ready",
            (false, _, true, _) => "failed",
            (false, _, false, true) => "no-output",
            _ => "unknown",
        }
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

pub async fn song_status(dirs: &PipelineDirs, video_id: &str) -> SongStatus {
    let file = format!("{video_id}.json");
    SongStatus {
        video_id: video_id.to_string(),
        pending: exists(&dirs.input.join(&file)).await,
        processed: exists(&dirs.processed.join(&file)).await,
        failed: exists(&dirs.error.join(&file)).await,
        generated: exists(&dirs.output.join(&file)).await,
    }
}

async fn json_stems(dir: &Path) -> Result<BTreeSet<String>> {
    let mut ids = BTreeSet::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
        Err(e) => return Err(e).with_context(|| format!("Failed to list {}", dir.display())),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.insert(stem.to_string());
            }
        }
    }
    Ok(ids)
}

/// Sorted ids that have a song document.
pub async fn list_generated(dirs: &PipelineDirs) -> Result<Vec<String>> {
    Ok(json_stems(&dirs.output).await?.into_iter().collect())
}

/// Sorted ids seen in any pipeline directory.
pub async fn list_known(dirs: &PipelineDirs) -> Result<Vec<String>> {
    let mut ids = BTreeSet::new();
    for dir in [&dirs.input, &dirs.processed, &dirs.error, &dirs.output] {
        ids.extend(json_stems(dir).await?);
    }
    Ok(ids.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::test_dirs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_song_status_and_listing() {
        let tmp = TempDir::new().unwrap();
        let dirs = test_dirs(tmp.path());
        std::fs::write(dirs.input.join("p.json"), "[]").unwrap();
        std::fs::write(dirs.processed.join("ok.json"), "[]").unwrap();
        std::fs::write(dirs.output.join("ok.json"), "{}").unwrap();
        std::fs::write(dirs.error.join("bad.json"), "x").unwrap();
        std::fs::write(dirs.output.join("legacy.json"), "{}").unwrap();

        let ok = song_status(&dirs, "ok").await;
        assert!(ok.processed && ok.generated && !ok.pending && !ok.failed);
        assert_eq!(ok.label(), "ready");

        assert_eq!(song_status(&dirs, "p").await.label(), "pending");
        assert_eq!(song_status(&dirs, "bad").await.label(), "failed");

        let missing = song_status(&dirs, "zzz").await;
        assert!(!missing.is_known());
        assert_eq!(missing.label(), "unknown");

        assert_eq!(list_generated(&dirs).await.unwrap(), vec!["legacy", "ok"]);
        assert_eq!(list_known(&dirs).await.unwrap(), vec!["bad", "legacy", "ok", "p"]);
    }
}
