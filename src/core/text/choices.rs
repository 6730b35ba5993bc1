//! Choice extraction from the tail of a finished story turn.
//!
//! The storyteller is asked to end each turn with a short list of options
//! ("1. Pet the cat", "- Look at the stars"). Only the last few non-empty lines
//! are scanned so list-like lines earlier in the prose are not mistaken for
//! choices.

use once_cell::sync::Lazy;
use regex::Regex;

/// How many trailing non-empty lines are considered.
pub const CHOICE_SCAN_LINES: usize = 5;

/// Digit + `.`/`)`, or a dash/asterisk/bullet, then the choice text.
static CHOICE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9][.)]|[-*•])\s*(.+)").expect("choice pattern is valid"));

/// Extract the next-action choices offered at the end of `full_text`.
///
/// Returns an empty vector when the turn ended without a list. The result is
/// in encounter order and not deduplicated.
pub fn extract_choices(full_text: &str) -> Vec<String> {
    let lines: Vec<&str> = full_text
        .split('\n')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let start = lines.len().saturating_sub(CHOICE_SCAN_LINES);
    lines[start..]
        .iter()
        .filter_map(|line| parse_choice_line(line))
        .collect()
}

/// Match a single trimmed line against the choice grammar.
pub fn parse_choice_line(line: &str) -> Option<String> {
    let caps = CHOICE_LINE.captures(line)?;
    let text = caps.get(2)?.as_str().trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
