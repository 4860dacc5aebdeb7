//! Rule-based bilingual verb tagger for the past-tense fraction.
//!
//! Replies are Korean with occasional English; a full POS tagger is not
//! warranted for a single scalar signal. Verbs are detected by suffix and
//! morpheme heuristics plus a small irregular table, and classified as past
//! or non-past. With no verbs found the fraction is defined as 0.0.

use std::sync::LazyLock;

use regex::Regex;

use super::lexical::tokenize;

/// Common English irregular past forms.
const EN_IRREGULAR_PAST: [&str; 18] = [
    "was", "were", "had", "did", "went", "said", "got", "made", "took", "came", "saw", "knew",
    "thought", "felt", "told", "gave", "found", "kept",
];

/// Common English base / present verb forms.
const EN_PRESENT: [&str; 16] = [
    "is", "are", "am", "be", "do", "does", "have", "has", "go", "get", "think", "feel", "want",
    "know", "say", "make",
];

/// Korean past-tense morphemes (했/었/았/였 stems).
static KO_PAST_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[했었았였]").expect("korean past pattern"));

/// Korean predicate endings marking a verb-like token.
static KO_PREDICATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(합니다|습니다|해요|네요|가요|까요|나요|어요|아요|여요|이에요|예요|거예요|세요|죠|다)$")
        .expect("korean predicate pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VerbTag {
    Past,
    NonPast,
}

fn tag_token(token: &str) -> Option<VerbTag> {
    if token.is_ascii() {
        if EN_IRREGULAR_PAST.contains(&token) {
            return Some(VerbTag::Past);
        }
        if token.len() > 3 && token.ends_with("ed") {
            return Some(VerbTag::Past);
        }
        if EN_PRESENT.contains(&token) {
            return Some(VerbTag::NonPast);
        }
        if token.len() > 4 && token.ends_with("ing") {
            return Some(VerbTag::NonPast);
        }
        return None;
    }

    let past = KO_PAST_PATTERN.is_match(token);
    if past {
        return Some(VerbTag::Past);
    }
    if KO_PREDICATE_PATTERN.is_match(token) {
        return Some(VerbTag::NonPast);
    }
    None
}

/// Among tagged verb tokens, the fraction classified as past tense.
pub fn fraction_past_tense_verbs(text: &str) -> f64 {
    let tokens = tokenize(text);
    let tags: Vec<VerbTag> = tokens.iter().filter_map(|t| tag_token(t)).collect();
    if tags.is_empty() {
        return 0.0;
    }
    let past = tags.iter().filter(|t| **t == VerbTag::Past).count();
    past as f64 / tags.len() as f64
}
