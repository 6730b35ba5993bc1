//! Tiered text segmentation for provider-safe narration chunks.
//!
//! Long stories exceed what a speech provider accepts in a single request, so
//! the text is cut into chunks no longer than `max_len` characters. Each cut is
//! placed at the best boundary available in the current window, in priority
//! order:
//!
//! 1. Paragraph break (`\n\n`) at or beyond 60% of the window
//! 2. Sentence end (`.`, `!`, `?` followed by whitespace) at or beyond 70%
//! 3. Secondary punctuation (`, `, `; `, `: `) at or beyond 80%
//! 4. The last space anywhere in the window
//! 5. A hard cut at exactly `max_len`
//!
//! Lengths are measured in Unicode scalar values, not bytes, so multi-byte
//! scripts get the same budget as ASCII text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default chunk length accepted by the narration provider.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 3000;

/// Minimum window fraction for a paragraph-break cut.
const PARAGRAPH_THRESHOLD: f64 = 0.6;
/// Minimum window fraction for a sentence-end cut.
const SENTENCE_THRESHOLD: f64 = 0.7;
/// Minimum window fraction for a secondary-punctuation cut.
const PUNCTUATION_THRESHOLD: f64 = 0.8;

static SENTENCE_END: Lazy<Regex> = Lazy::new(|| {
    // Terminator followed by any whitespace; the cut lands after the terminator.
    Regex::new(r"[.!?]\s").expect("sentence-end pattern is valid")
});

/// One bounded, zero-indexed slice of story text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Position of this chunk in the partition (0-based)
    pub index: usize,
    /// Trimmed chunk text
    pub text: String,
}

impl TextChunk {
    /// Length of the chunk in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Which boundary rule produced a cut. Exposed for diagnostics and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Paragraph,
    Sentence,
    Punctuation,
    Word,
    Hard,
}

/// Split `text` into ordered chunks of at most `max_len` characters.
///
/// The input is trimmed first. Whitespace-only input yields no chunks; input
/// that already fits yields exactly one chunk equal to the trimmed text.
pub fn segment(text: &str, max_len: usize) -> Vec<TextChunk> {
    segment_with_boundaries(text, max_len)
        .into_iter()
        .map(|(chunk, _)| chunk)
        .collect()
}

/// Same as [`segment`], also reporting which rule ended each chunk.
///
/// The final chunk (the remainder that fit) reports `None`.
pub fn segment_with_boundaries(text: &str, max_len: usize) -> Vec<(TextChunk, Option<Boundary>)> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut remaining = text.trim();

    while !remaining.is_empty() {
        let window_end = byte_offset_of_char(remaining, max_len);
        if window_end == remaining.len() {
            chunks.push((
                TextChunk {
                    index: chunks.len(),
                    text: remaining.to_string(),
                },
                None,
            ));
            break;
        }

        let window = &remaining[..window_end];
        let (split, boundary) = find_split(window, max_len);

        let head = remaining[..split].trim();
        if !head.is_empty() {
            chunks.push((
                TextChunk {
                    index: chunks.len(),
                    text: head.to_string(),
                },
                Some(boundary),
            ));
        }
        remaining = remaining[split..].trim();
    }

    chunks
}

/// Pick the byte offset to cut `window` at. Always returns a value in
/// `1..=window.len()` so the loop makes progress.
fn find_split(window: &str, max_len: usize) -> (usize, Boundary) {
    let limit = max_len as f64;

    if let Some(idx) = window.rfind("\n\n")
        && char_count(window, idx) as f64 >= limit * PARAGRAPH_THRESHOLD
    {
        return (idx + 2, Boundary::Paragraph);
    }

    if let Some(m) = SENTENCE_END.find_iter(window).last() {
        let idx = m.start() + 1;
        if char_count(window, idx) as f64 >= limit * SENTENCE_THRESHOLD {
            return (idx, Boundary::Sentence);
        }
    }

    let punct = [", ", "; ", ": "]
        .iter()
        .filter_map(|p| window.rfind(p))
        .max();
    if let Some(idx) = punct
        && char_count(window, idx) as f64 >= limit * PUNCTUATION_THRESHOLD
    {
        return (idx + 1, Boundary::Punctuation);
    }

    match window.rfind(' ') {
        Some(idx) if idx > 0 => (idx, Boundary::Word),
        _ => (window.len(), Boundary::Hard),
    }
}

/// Number of chars in `s[..byte_idx]`.
#[inline]
fn char_count(s: &str, byte_idx: usize) -> usize {
    s[..byte_idx].chars().count()
}

/// Byte offset of the `n`th char, or `s.len()` when `s` has `n` or fewer chars.
fn byte_offset_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}
