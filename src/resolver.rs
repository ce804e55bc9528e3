//! Matching free-text oracle answers against the roster

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize a name for comparison
///
/// Canonical decomposition, combining marks dropped, whitespace runs
/// collapsed to a single space, lowercased. Normalized strings are a fixed
/// point.
pub fn normalize(name: &str) -> String {
    let stripped: String = name.nfd().filter(|c| !is_combining_mark(*c)).collect();
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Find the roster name matching `raw`, if any
///
/// Returns the first roster entry whose normalized form equals the
/// normalized answer.
pub fn resolve<'a, S: AsRef<str>>(raw: &str, roster: &'a [S]) -> Option<&'a str> {
    let wanted = normalize(raw);
    roster
        .iter()
        .map(|name| name.as_ref())
        .find(|name| normalize(name) == wanted)
}
