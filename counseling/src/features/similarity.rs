//! Semantic repetition against the previous assistant reply.

use std::collections::HashSet;

use super::lexical::tokenize;

/// Token-set Jaccard overlap between two texts.
fn token_jaccard(a: &str, b: &str) -> f64 {
    let set_a: HashSet<String> = tokenize(a).into_iter().collect();
    let set_b: HashSet<String> = tokenize(b).into_iter().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// Similarity between a reply and the previous reply, as the mean of
/// token-set Jaccard overlap and character-sequence similarity.
///
/// Returns 0.0 if either text is absent or blank.
pub fn semantic_repetition(reply: &str, previous: Option<&str>) -> f64 {
    let Some(previous) = previous else {
        return 0.0;
    };
    let (a, b) = (reply.trim(), previous.trim());
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let jaccard = token_jaccard(a, b);
    let chars = strsim::normalized_levenshtein(a, b);
    ((jaccard + chars) / 2.0).clamp(0.0, 1.0)
}
