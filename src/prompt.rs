//! Prompt assembly: template substitution and few-shot examples.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::llm::ChatMessage;
use crate::models::LyricSegment;

/// At most this many example documents go into a prompt.
pub const MAX_EXAMPLES: usize = 5;

pub const TITLE_PLACEHOLDER: &str = "[Song Title]";
pub const ARTIST_PLACEHOLDER: &str = "[Artist]";

const SYSTEM_INSTRUCTION: &str = "You annotate song lyrics for language learners. \
Respond with a single JSON object and nothing else: no prose, no code fences. \
The object must have a \"sections\" array whose entries hold \"lines\" of \
{\"spanish\", \"english\", \"explanation\"} objects. Copy every original lyric line \
verbatim into \"spanish\", in the original order.";

// ============================================================================
// Example cache
// ============================================================================

/// Few-shot example documents, loaded on first use.
///
/// Long-running modes call [`ExampleCache::invalidate`] before each batch so
/// edits to the examples directory are picked up without a restart.
#[derive(Debug)]
pub struct ExampleCache {
    dir: PathBuf,
    loaded: Option<Vec<String>>,
}

impl ExampleCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loaded: None,
        }
    }

    pub fn invalidate(&mut self) {
        self.loaded = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// Return the cached examples, reading the directory if needed.
    pub async fn get(&mut self) -> Result<&[String]> {
        if self.loaded.is_none() {
            self.loaded = Some(load_examples(&self.dir).await?);
        }
        Ok(self.loaded.as_deref().unwrap_or_default())
    }
}

/// Read up to [`MAX_EXAMPLES`] `*.json` documents, sorted by file name.
/// Files that are not valid JSON are skipped with a warning.
pub async fn load_examples(dir: &Path) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Examples directory {} does not exist, prompting without examples", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to list {}", dir.display())),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut examples = Vec::with_capacity(MAX_EXAMPLES);
    for path in paths {
        if examples.len() == MAX_EXAMPLES {
            break;
        }
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read example {}", path.display()))?;
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value) => {
                debug!("Loaded example {}", path.display());
                examples.push(serde_json::to_string_pretty(&value)?);
            }
            Err(e) => warn!("Skipping example {}: {}", path.display(), e),
        }
    }
    Ok(examples)
}

// ============================================================================
// Messages
// ============================================================================

pub fn fill_template(template: &str, title: &str, artist: &str) -> String {
    template
        .replace(TITLE_PLACEHOLDER, title)
        .replace(ARTIST_PLACEHOLDER, artist)
}

pub async fn load_template(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read prompt template {}", path.display()))
}

/// System message (instruction and examples) followed by the user message
/// (filled template and the lyric lines, one per line).
pub fn build_messages(
    template: &str,
    title: &str,
    artist: &str,
    examples: &[String],
    segments: &[LyricSegment],
) -> Vec<ChatMessage> {
    let mut system = String::from(SYSTEM_INSTRUCTION);
    for (i, example) in examples.iter().enumerate() {
        system.push_str(&format!("\n\nExample {}:\n{}", i + 1, example));
    }

    let mut user = fill_template(template, title, artist);
    user.push_str("\n\nLyrics:\n");
    let lyrics: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
    user.push_str(&lyrics.join("\n"));

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_fill_template() {
        let out = fill_template("Analyze \"[Song Title]\" by [Artist]. [Artist]!", "Hola", "Ana");
        assert_eq!(out, "Analyze \"Hola\" by Ana. Ana!");
    }

    #[tokio::test]
    async fn test_examples_sorted_capped_and_validated() {
        let dir = TempDir::new().unwrap();
        for name in ["g", "b", "f", "a", "e", "d"] {
            write(dir.path(), &format!("{name}.json"), &format!("{{\"id\": \"{name}\"}}"));
        }
        write(dir.path(), "c.json", "not json");
        write(dir.path(), "notes.txt", "ignored");

        let examples = load_examples(dir.path()).await.unwrap();
        assert_eq!(examples.len(), MAX_EXAMPLES);
        let ids: Vec<String> = examples
            .iter()
            .map(|e| serde_json::from_str::<serde_json::Value>(e).unwrap()["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "d", "e", "f"]);
    }

    #[tokio::test]
    async fn test_missing_examples_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let examples = load_examples(&dir.path().join("missing")).await.unwrap();
        assert!(examples.is_empty());
    }

    #[tokio::test]
    async fn test_cache_invalidate_rereads() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.json", "{}");
        let mut cache = ExampleCache::new(dir.path());
        assert_eq!(cache.get().await.unwrap().len(), 1);

        write(dir.path(), "b.json", "{}");
        assert_eq!(cache.get().await.unwrap().len(), 1);

        cache.invalidate();
        assert!(!cache.is_loaded());
        assert_eq!(cache.get().await.unwrap().len(), 2);
    }

    #[test]
    fn test_build_messages() {
        let segs = vec![LyricSegment::new("Hola", 0, 1000), LyricSegment::new("Adiós", 1000, 2000)];
        let msgs = build_messages("Song: [Song Title] / [Artist]", "T", "A", &["{}".to_string()], &segs);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, "system");
        assert!(msgs[0].content.contains("Example 1:\n{}"));
        assert_eq!(msgs[1].role, "user");
        assert!(msgs[1].content.starts_with("Song: T / A"));
        assert!(msgs[1].content.ends_with("Lyrics:\nHola\nAdiós"));
    }
}
