//! Token-set similarity used to keep the interviewer from repeating itself.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9']+").expect("static regex"));

/// Default threshold at which two utterances count as the same prompt.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.75;

/// Lowercased word tokens.
pub fn tokens(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lower)
        .map(|m| m.as_str().trim_matches('\'').to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Jaccard similarity of the two token sets (1.0 when both are empty).
pub fn jaccard(a: &str, b: &str) -> f32 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let inter = ta.intersection(&tb).count() as f32;
    let union = ta.union(&tb).count() as f32;
    inter / union
}

pub fn is_too_similar(a: &str, b: &str, threshold: f32) -> bool {
    jaccard(a, b) >= threshold
}

/// Word count used by the brevity heuristics.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
