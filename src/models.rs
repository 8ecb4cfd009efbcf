//! Core data models for the lyrics analysis pipeline.
//!
//! This module contains the struct definitions shared by the pipeline
//! stages: raw segments read from disk, items returned by the LLM, and the
//! song documents written for the app.

use serde::{Deserialize, Serialize};

/// Placeholder translation for lines the analysis did not cover.
pub const MISSING_TRANSLATION: &str = "...";

/// Title of the single section every generated song carries.
pub const DEFAULT_SECTION_TITLE: &str = "Lyrics";

// ============================================================================
// Input Models
// ============================================================================

/// One timestamped unit of original lyric text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricSegment {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl LyricSegment {
    pub fn new(text: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        Self {
            text: text.into(),
            start_ms,
            end_ms,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.end_ms >= self.start_ms
    }
}

// ============================================================================
// LLM Models
// ============================================================================

/// One translation/explanation entry produced by the LLM, keyed by source text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisItem {
    pub spanish: String,
    pub english: String,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AnalysisSection {
    #[serde(default)]
    pub lines: Vec<AnalysisItem>,
}

/// The JSON object returned by the LLM.
///
/// Models do not agree on the envelope: some mirror the few-shot song
/// documents (`sections[].lines`), others return a flat `lines` or `lyrics`
/// array. All three are accepted; the items are flattened in order.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum SongAnalysis {
    Sectioned { sections: Vec<AnalysisSection> },
    Lines { lines: Vec<AnalysisItem> },
    Lyrics { lyrics: Vec<AnalysisItem> },
}

impl SongAnalysis {
    pub fn into_items(self) -> Vec<AnalysisItem> {
        match self {
            SongAnalysis::Sectioned { sections } => {
                sections.into_iter().flat_map(|s| s.lines).collect()
            }
            SongAnalysis::Lines { lines } => lines,
            SongAnalysis::Lyrics { lyrics } => lyrics,
        }
    }
}

// ============================================================================
// Output Models
// ============================================================================

/// A lyric segment enriched with its matched translation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalLine {
    pub spanish: String,
    pub english: String,
    pub explanation: Option<String>,
    pub start_ms: u64,
    pub end_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub lines: Vec<FinalLine>,
}

/// The document served to the app, one per video id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongDocument {
    pub video_id: String,
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub sections: Vec<Section>,
}

impl SongDocument {
    pub fn line_count(&self) -> usize {
        self.sections.iter().map(|s| s.lines.len()).sum()
    }
}
