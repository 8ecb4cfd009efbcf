//! Running per-language counters for processed songs.
//!
//! The file is read at the start of a run and rewritten after every
//! successfully processed song. There is no locking: two pipelines sharing
//! one stats file will lose updates.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::write_json_atomic;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageStat {
    pub count: u64,
    pub last_processed: DateTime<Utc>,
}

/// Language code → counters, serialized as a plain JSON object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageStats {
    pub languages: BTreeMap<String, LanguageStat>,
}

impl LanguageStats {
    /// Load the stats file. A missing file is an empty history; a corrupt
    /// one is logged and replaced on the next save.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read stats file {}", path.display()))
            }
        };

        match serde_json::from_str(&raw) {
            Ok(stats) => Ok(stats),
            Err(e) => {
                warn!("Stats file {} is corrupt ({}), starting fresh", path.display(), e);
                Ok(Self::default())
            }
        }
    }

    pub fn record(&mut self, language: &str, at: DateTime<Utc>) {
        let entry = self
            .languages
            .entry(language.to_string())
            .or_insert(LanguageStat {
                count: 0,
                last_processed: at,
            });
        entry.count += 1;
        entry.last_processed = at;
    }

    pub fn total(&self) -> u64 {
        self.languages.values().map(|s| s.count).sum()
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self).await
    }

    /// Load, bump one language, save.
    pub async fn record_and_save(path: &Path, language: &str, at: DateTime<Utc>) -> Result<Self> {
        let mut stats = Self::load(path).await?;
        stats.record(language, at);
        stats.save(path).await?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let stats = LanguageStats::load(&dir.path().join("nope.json")).await.unwrap();
        assert_eq!(stats.total(), 0);
    }

    #[tokio::test]
    async fn test_record_and_roundtrip_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("language-stats.json");
        let t1 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 3, 2, 8, 30, 0).unwrap();

        LanguageStats::record_and_save(&path, "es", t1).await.unwrap();
        LanguageStats::record_and_save(&path, "es", t2).await.unwrap();
        let stats = LanguageStats::record_and_save(&path, "unknown", t1).await.unwrap();

        assert_eq!(stats.total(), 3);
        assert_eq!(stats.languages["es"].count, 2);
        assert_eq!(stats.languages["es"].last_processed, t2);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["es"]["count"], 2);
        assert_eq!(raw["es"]["lastProcessed"], "2026-03-02T08:30:00Z");
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("language-stats.json");
        std::fs::write(&path, "{ not json").unwrap();
        let stats = LanguageStats::load(&path).await.unwrap();
        assert_eq!(stats, LanguageStats::default());
    }
}
