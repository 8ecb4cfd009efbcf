//! Video metadata lookup and video id handling.
//!
//! Metadata is a best-effort enrichment: a failed lookup degrades to a
//! `Fallback` outcome and never blocks processing.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

const OEMBED_BASE_URL: &str = "https://www.youtube.com";
const USER_AGENT: &str = concat!("easysong-pipeline/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("network error: {0}")]
    Network(String),

    #[error("video not found or not embeddable: {0}")]
    NotFound(String),

    #[error("metadata API error {0}")]
    Api(u16),

    #[error("parse error: {0}")]
    Parse(String),
}

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Bare 11-character id or the common URL forms.
static VIDEO_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?:youtube\.com/watch\?(?:.*&)?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/shorts/)([A-Za-z0-9_-]{11})").unwrap(),
        Regex::new(r"^([A-Za-z0-9_-]{11})$").unwrap(),
    ]
});

/// Video decorations stripped from titles (applied in order).
static TITLE_DECORATIONS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // "(Official Video)", "[Official Music Video]", "(Video Oficial)"
        Regex::new(r"(?i)\s*[\(\[](?:official\s+)?(?:music\s+)?video(?:\s+oficial)?(?:\s+official)?[\)\]]").unwrap(),
        // "(Lyric Video)", "(Lyrics)", "[Letra]", "(Con Letra)"
        Regex::new(r"(?i)\s*[\(\[](?:official\s+)?(?:lyric(?:s)?(?:\s+video)?|(?:con\s+)?letra(?:s)?|video\s+lyric)[\)\]]").unwrap(),
        // "(Audio)", "(Official Audio)", "[Audio Oficial]"
        Regex::new(r"(?i)\s*[\(\[](?:official\s+)?audio(?:\s+oficial)?[\)\]]").unwrap(),
        // "(Visualizer)", "(Official Visualizer)"
        Regex::new(r"(?i)\s*[\(\[](?:official\s+)?visuali[sz]er[\)\]]").unwrap(),
        // "| Official Video" trailers
        Regex::new(r"(?i)\s*\|\s*(?:official|video|lyric).*$").unwrap(),
    ]
});

/// "VEVO" suffix on channel names: "ShakiraVEVO" → "Shakira"
static VEVO_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*VEVO$").unwrap());

// ============================================================================
// VIDEO IDS
// ============================================================================

/// Extract a video id from a bare id or a watch/share/embed/shorts URL.
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    VIDEO_ID_PATTERNS
        .iter()
        .find_map(|p| p.captures(input))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

// ============================================================================
// METADATA
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoMetadata {
    pub title: String,
    pub artist: String,
    pub thumbnail_url: String,
}

/// Outcome of a best-effort lookup: failure is explicit in the data rather
/// than hidden behind sentinel strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataOutcome {
    Enriched(VideoMetadata),
    Fallback { reason: String },
}

impl MetadataOutcome {
    pub fn is_enriched(&self) -> bool {
        matches!(self, MetadataOutcome::Enriched(_))
    }

    /// Values to write into a song document. The fallback uses the
    /// "Unknown Title" / "Unknown Artist" / empty-thumbnail triple.
    pub fn resolved(&self) -> VideoMetadata {
        match self {
            MetadataOutcome::Enriched(meta) => meta.clone(),
            MetadataOutcome::Fallback { .. } => VideoMetadata {
                title: UNKNOWN_TITLE.to_string(),
                artist: UNKNOWN_ARTIST.to_string(),
                thumbnail_url: String::new(),
            },
        }
    }
}

pub type MetadataFuture<'a> = Pin<Box<dyn Future<Output = Result<VideoMetadata, MetadataError>> + Send + 'a>>;

pub trait MetadataSource: Send + Sync {
    fn lookup<'a>(&'a self, video_id: &'a str) -> MetadataFuture<'a>;
}

/// Look up metadata, degrading to `Fallback` on any error.
pub async fn fetch_metadata(source: &dyn MetadataSource, video_id: &str) -> MetadataOutcome {
    match source.lookup(video_id).await {
        Ok(meta) => {
            debug!(video_id, title = %meta.title, artist = %meta.artist, "Metadata resolved");
            MetadataOutcome::Enriched(meta)
        }
        Err(e) => {
            warn!(video_id, "Metadata lookup failed, using placeholders: {}", e);
            MetadataOutcome::Fallback { reason: e.to_string() }
        }
    }
}

/// Default thumbnail for a video id.
pub fn thumbnail_for(video_id: &str) -> String {
    format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", video_id)
}

/// Split a raw video title and channel name into (title, artist).
/// e.g., ("Shakira - Hips Don't Lie (Official Video)", "ShakiraVEVO") → ("Hips Don't Lie", "Shakira")
pub fn split_title_artist(raw_title: &str, channel: &str) -> (String, String) {
    let mut title = raw_title.to_string();
    for pattern in TITLE_DECORATIONS.iter() {
        title = pattern.replace_all(&title, "").to_string();
    }
    let title = title.trim();

    let separators = [" - ", " – ", " — "];
    if let Some((artist, song)) = separators.iter().find_map(|sep| title.split_once(sep)) {
        let (artist, song) = (artist.trim(), song.trim());
        if !artist.is_empty() && !song.is_empty() {
            return (song.to_string(), artist.to_string());
        }
    }

    let channel = channel.trim();
    let channel = channel.strip_suffix(" - Topic").unwrap_or(channel);
    let channel = VEVO_SUFFIX.replace(channel, "").trim().to_string();
    let artist = if channel.is_empty() {
        UNKNOWN_ARTIST.to_string()
    } else {
        channel
    };
    (title.to_string(), artist)
}

#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    title: String,
    #[serde(default)]
    author_name: String,
    #[serde(default)]
    thumbnail_url: Option<String>,
}

/// YouTube oEmbed endpoint; needs no API key.
pub struct OEmbedSource {
    http: reqwest::Client,
    base_url: String,
}

impl OEmbedSource {
    pub fn new() -> Result<Self, MetadataError> {
        Self::with_base_url(OEMBED_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, MetadataError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| MetadataError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    async fn fetch(&self, video_id: &str) -> Result<VideoMetadata, MetadataError> {
        let url = format!("{}/oembed", self.base_url.trim_end_matches('/'));
        let watch_url = format!("https://www.youtube.com/watch?v={}", video_id);

        let response = self
            .http
            .get(&url)
            .query(&[("url", watch_url.as_str()), ("format", "json")])
            .send()
            .await
            .map_err(|e| MetadataError::Network(e.to_string()))?;

        let status = response.status();
        if status == 404 || status == 401 || status == 403 {
            return Err(MetadataError::NotFound(video_id.to_string()));
        }
        if !status.is_success() {
            return Err(MetadataError::Api(status.as_u16()));
        }

        let body: OEmbedResponse = response
            .json()
            .await
            .map_err(|e| MetadataError::Parse(e.to_string()))?;

        let (title, artist) = split_title_artist(&body.title, &body.author_name);
        Ok(VideoMetadata {
            title,
            artist,
            thumbnail_url: body
                .thumbnail_url
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| thumbnail_for(video_id)),
        })
    }
}

impl MetadataSource for OEmbedSource {
    fn lookup<'a>(&'a self, video_id: &'a str) -> MetadataFuture<'a> {
        Box::pin(self.fetch(video_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_video_id() {
        let id = "dQw4w9WgXcQ";
        assert_eq!(extract_video_id(id).as_deref(), Some(id));
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ").as_deref(), Some(id));
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?list=PL1&v=dQw4w9WgXcQ&t=3").as_deref(),
            Some(id)
        );
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQ?si=abc").as_deref(), Some(id));
        assert_eq!(extract_video_id("youtube.com/embed/dQw4w9WgXcQ").as_deref(), Some(id));
        assert_eq!(extract_video_id("https://youtube.com/shorts/dQw4w9WgXcQ").as_deref(), Some(id));
        assert_eq!(extract_video_id("not a video"), None);
        assert_eq!(extract_video_id("short"), None);
    }

    #[test]
    fn test_split_title_artist() {
        assert_eq!(
            split_title_artist("Shakira - Hips Don't Lie (Official Video)", "shakiraVEVO"),
            ("Hips Don't Lie".to_string(), "Shakira".to_string())
        );
        assert_eq!(
            split_title_artist("Despacito [Letra]", "Luis Fonsi - Topic"),
            ("Despacito".to_string(), "Luis Fonsi".to_string())
        );
        assert_eq!(
            split_title_artist("Bailando (Audio)", "EnriqueIglesiasVEVO"),
            ("Bailando".to_string(), "EnriqueIglesias".to_string())
        );
        assert_eq!(
            split_title_artist("La Bicicleta", ""),
            ("La Bicicleta".to_string(), UNKNOWN_ARTIST.to_string())
        );
    }

    #[test]
    fn test_fallback_resolves_to_placeholders() {
        let outcome = MetadataOutcome::Fallback {
            reason: "offline".into(),
        };
        assert!(!outcome.is_enriched());
        let meta = outcome.resolved();
        assert_eq!(meta.title, UNKNOWN_TITLE);
        assert_eq!(meta.artist, UNKNOWN_ARTIST);
        assert_eq!(meta.thumbnail_url, "");
    }

    #[tokio::test]
    async fn test_oembed_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oembed"))
            .and(query_param("format", "json"))
            .and(query_param("url", "https://www.youtube.com/watch?v=kJQP7kiw5Fk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "title": "Luis Fonsi - Despacito ft. Daddy Yankee",
                "author_name": "LuisFonsiVEVO",
                "thumbnail_url": "https://i.ytimg.com/vi/kJQP7kiw5Fk/hqdefault.jpg"
            })))
            .mount(&server)
            .await;

        let source = OEmbedSource::with_base_url(server.uri()).unwrap();
        let outcome = fetch_metadata(&source, "kJQP7kiw5Fk").await;
        assert_eq!(
            outcome,
            MetadataOutcome::Enriched(VideoMetadata {
                title: "Despacito ft. Daddy Yankee".into(),
                artist: "Luis Fonsi".into(),
                thumbnail_url: "https://i.ytimg.com/vi/kJQP7kiw5Fk/hqdefault.jpg".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_oembed_failure_degrades() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = OEmbedSource::with_base_url(server.uri()).unwrap();
        let outcome = fetch_metadata(&source, "aaaaaaaaaaa").await;
        assert!(matches!(outcome, MetadataOutcome::Fallback { .. }));
        assert_eq!(outcome.resolved().title, UNKNOWN_TITLE);
    }
}
