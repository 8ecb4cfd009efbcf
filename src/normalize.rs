//! Lyric line normalization and reconciliation.
//!
//! The LLM's line ordering and count are untrusted, so translations are
//! matched back onto the original segments by normalized text rather than by
//! position. The original segments always drive the output.
//!
//! CRITICAL: changing `normalize` changes which existing lines match. Run the
//! tests after edits.

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use unicode_normalization::UnicodeNormalization;

use crate::models::{AnalysisItem, FinalLine, LyricSegment, MISSING_TRANSLATION};

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Punctuation removed before matching: `. , / # ! $ % ^ & * ; : { } = - _ ` ~ ( ) ? ¿ ¡`
pub static LINE_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.,/#!$%^&*;:{}=\-_`~()?¿¡]").unwrap());

/// Regex to collapse whitespace runs into a single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Similarity below which a near-miss is not worth reporting.
const NEAR_MISS_THRESHOLD: f64 = 0.6;

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Normalize a lyric line for matching.
/// e.g., "¡Hola, Mundo!" → "hola mundo"
///
/// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let composed: String = text.nfc().collect();
    let stripped = LINE_PUNCTUATION.replace_all(&composed, "");
    let collapsed = MULTI_SPACE.replace_all(&stripped, " ");
    let lowered = collapsed.trim().to_lowercase();
    // Stripping can leave a combining mark next to its base letter.
    lowered.nfc().collect()
}

// ============================================================================
// INDEX + RECONCILIATION
// ============================================================================

/// Translation payload stored per normalized key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedAnalysis {
    pub english: String,
    pub explanation: Option<String>,
}

/// Maps normalized `spanish` text to its translation.
pub type AnalysisIndex = FxHashMap<String, IndexedAnalysis>;

/// Build the lookup index. Later items overwrite earlier ones on key collision.
pub fn build_index(items: &[AnalysisItem]) -> AnalysisIndex {
    let mut index = AnalysisIndex::default();
    for item in items {
        index.insert(
            normalize(&item.spanish),
            IndexedAnalysis {
                english: item.english.clone(),
                explanation: item.explanation.clone(),
            },
        );
    }
    index
}

/// Produce exactly one `FinalLine` per segment, in segment order.
pub fn reconcile(segments: &[LyricSegment], index: &AnalysisIndex) -> Vec<FinalLine> {
    segments
        .iter()
        .map(|seg| match index.get(&normalize(&seg.text)) {
            Some(hit) => FinalLine {
                spanish: seg.text.clone(),
                english: hit.english.clone(),
                explanation: hit.explanation.clone(),
                start_ms: seg.start_ms,
                end_ms: seg.end_ms,
            },
            None => FinalLine {
                spanish: seg.text.clone(),
                english: MISSING_TRANSLATION.to_string(),
                explanation: None,
                start_ms: seg.start_ms,
                end_ms: seg.end_ms,
            },
        })
        .collect()
}

// ============================================================================
// DIAGNOSTICS
// ============================================================================

/// A segment that found no translation.
#[derive(Clone, Debug, PartialEq)]
pub struct UnmatchedLine {
    pub position: usize,
    pub text: String,
    /// Closest analysis key and its similarity, when one is reasonably close.
    pub nearest: Option<(String, f64)>,
}

/// What happened during reconciliation. Purely informational: the lines
/// returned alongside it are identical to `reconcile`'s.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcileReport {
    pub total: usize,
    pub matched: usize,
    pub unmatched: Vec<UnmatchedLine>,
    /// Normalized keys produced by more than one analysis item (last one wins).
    pub analysis_collisions: Vec<String>,
    /// Normalized keys shared by distinct original lines; they all get the same translation.
    pub segment_collisions: Vec<String>,
}

impl ReconcileReport {
    pub fn match_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            100.0 * self.matched as f64 / self.total as f64
        }
    }
}

/// Reconcile and collect diagnostics in one pass.
pub fn reconcile_with_report(
    segments: &[LyricSegment],
    items: &[AnalysisItem],
) -> (Vec<FinalLine>, ReconcileReport) {
    let index = build_index(items);
    let lines = reconcile(segments, &index);

    let mut report = ReconcileReport {
        total: segments.len(),
        ..Default::default()
    };

    let mut seen_items: FxHashSet<String> = FxHashSet::default();
    for item in items {
        let key = normalize(&item.spanish);
        if !seen_items.insert(key.clone()) && !report.analysis_collisions.contains(&key) {
            report.analysis_collisions.push(key);
        }
    }

    // Distinct raw texts that collapse onto one key; exact repeats (refrains) are fine.
    let mut raw_by_key: FxHashMap<String, String> = FxHashMap::default();
    for (position, seg) in segments.iter().enumerate() {
        let key = normalize(&seg.text);
        match raw_by_key.get(&key) {
            Some(raw) if raw != &seg.text && !report.segment_collisions.contains(&key) => {
                report.segment_collisions.push(key.clone());
            }
            Some(_) => {}
            None => {
                raw_by_key.insert(key.clone(), seg.text.clone());
            }
        }

        if index.contains_key(&key) {
            report.matched += 1;
        } else {
            report.unmatched.push(UnmatchedLine {
                position,
                text: seg.text.clone(),
                nearest: nearest_key(&key, &index),
            });
        }
    }

    (lines, report)
}

fn nearest_key(key: &str, index: &AnalysisIndex) -> Option<(String, f64)> {
    index
        .keys()
        .map(|candidate| (candidate, strsim::normalized_levenshtein(key, candidate)))
        .filter(|(_, score)| *score >= NEAR_MISS_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(candidate, score)| (candidate.clone(), score))
}

// ============================================================================
// TESTS
// ============================================================================
