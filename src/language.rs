//! Crude language detection for lyric files.
//!
//! Counts common function words in the first few lines against small fixed
//! vocabularies. This is a heuristic for bookkeeping only: short or mixed
//! lyrics are often misclassified, and anything without a clear winner is
//! reported as `unknown`.

use once_cell::sync::Lazy;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::models::LyricSegment;

pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Only the opening lines are inspected.
pub const SAMPLE_LINES: usize = 10;

// ============================================================================
// VOCABULARIES
// ============================================================================

/// Function words per language code. Overlaps between languages are kept
/// small on purpose; shared words only add to both scores.
static VOCABULARIES: Lazy<Vec<(&'static str, FxHashSet<&'static str>)>> = Lazy::new(|| {
    let table: [(&str, &[&str]); 6] = [
        (
            "es",
            &[
                "el", "los", "las", "que", "y", "pero", "porque", "yo", "tú", "mi", "mí", "me",
                "te", "eres", "estoy", "está", "quiero", "corazón", "con", "del", "una", "nada",
                "cuando", "muy", "también", "qué", "sin", "amor", "vida", "noche",
            ],
        ),
        (
            "en",
            &[
                "the", "and", "you", "your", "i", "i'm", "me", "my", "it's", "don't", "with",
                "what", "this", "that", "is", "are", "love", "we", "of", "to", "baby", "can't",
            ],
        ),
        (
            "pt",
            &[
                "você", "não", "eu", "meu", "minha", "com", "uma", "coração", "então", "tudo",
                "são", "ao", "pra", "gente", "isso", "vou", "tem", "nós",
            ],
        ),
        (
            "fr",
            &[
                "je", "les", "et", "est", "pas", "mon", "ma", "avec", "pour", "qui", "c'est",
                "moi", "toi", "nous", "vous", "dans", "sur", "j'ai", "suis",
            ],
        ),
        (
            "it",
            &[
                "il", "che", "non", "sono", "per", "della", "cuore", "perché", "amore", "io",
                "sei", "questo", "gli", "ancora", "come", "tutto",
            ],
        ),
        (
            "de",
            &[
                "ich", "und", "nicht", "du", "der", "die", "das", "ist", "mit", "mein", "dich",
                "liebe", "ein", "eine", "auf", "wir", "sie",
            ],
        ),
    ];

    table
        .iter()
        .map(|(code, words)| (*code, words.iter().copied().collect()))
        .collect()
});

fn tokenize(line: &str) -> impl Iterator<Item = String> + '_ {
    line.split(|c: char| !(c.is_alphabetic() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| !w.is_empty())
}

/// Score each language over the first `SAMPLE_LINES` segments.
pub fn language_scores(segments: &[LyricSegment]) -> FxHashMap<&'static str, usize> {
    let mut scores: FxHashMap<&'static str, usize> = FxHashMap::default();
    for seg in segments.iter().take(SAMPLE_LINES) {
        for word in tokenize(&seg.text) {
            for (code, vocab) in VOCABULARIES.iter() {
                if vocab.contains(word.as_str()) {
                    *scores.entry(*code).or_default() += 1;
                }
            }
        }
    }
    scores
}

/// Detect the language of a lyric file. Returns a two-letter code or `unknown`.
pub fn detect_language(segments: &[LyricSegment]) -> &'static str {
    let scores = language_scores(segments);
    let best = scores.values().copied().max().unwrap_or(0);
    if best == 0 {
        return UNKNOWN_LANGUAGE;
    }
    let mut leaders = scores.iter().filter(|(_, score)| **score == best);
    match (leaders.next(), leaders.next()) {
        (Some((code, _)), None) => *code,
        _ => UNKNOWN_LANGUAGE,
    }
}
