//! Feature extraction — pure text signals feeding the drift scorer.
//!
//! Extraction is deterministic, side-effect free, and never fails: undefined
//! ratios (empty text, no verbs) are 0.0, and every scalar lies in [0, 1].

mod lexical;
mod similarity;
mod tagger;

use std::collections::BTreeMap;

use serde::Serialize;

pub use lexical::is_degenerate;

/// Scalar feature names, in the order they appear in [`FeatureVector::as_map`].
pub const FEATURE_NAMES: [&str; 6] = [
    "repeated_words",
    "unique_words",
    "style_shift",
    "past_tense",
    "question_ratio",
    "semantic_repetition",
];

/// Named scalar features of a reply, each in [0, 1], plus the degenerate flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    /// Fraction of word occurrences appearing at least twice.
    pub repeated_words: f64,
    /// Fraction of word occurrences appearing exactly once.
    pub unique_words: f64,
    /// Slang / aggressive-register matches per word.
    pub style_shift: f64,
    /// Among detected verbs, the fraction in past tense.
    pub past_tense: f64,
    /// Fraction of sentence segments that are questions.
    pub question_ratio: f64,
    /// Similarity to the previous assistant reply.
    pub semantic_repetition: f64,
    /// Structurally meaningless text (pure repetition, filler glyphs).
    pub degenerate: bool,
}

impl FeatureVector {
    /// The scalar features keyed by name, for the weighted scorer.
    pub fn as_map(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("repeated_words", self.repeated_words),
            ("unique_words", self.unique_words),
            ("style_shift", self.style_shift),
            ("past_tense", self.past_tense),
            ("question_ratio", self.question_ratio),
            ("semantic_repetition", self.semantic_repetition),
        ])
    }
}

/// Extract the feature vector for a reply, optionally against the previous
/// assistant reply.
pub fn extract(reply: &str, previous_reply: Option<&str>) -> FeatureVector {
    FeatureVector {
        repeated_words: lexical::fraction_repeated_words(reply),
        unique_words: lexical::fraction_unique_words(reply),
        style_shift: lexical::fraction_style_shift(reply),
        past_tense: tagger::fraction_past_tense_verbs(reply),
        question_ratio: lexical::fraction_question_sentences(reply),
        semantic_repetition: similarity::semantic_repetition(reply, previous_reply),
        degenerate: lexical::is_degenerate(reply),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_bounded(features: &FeatureVector) {
        for (name, value) in features.as_map() {
            assert!(
                (0.0..=1.0).contains(&value),
                "{name} out of bounds: {value}"
            );
        }
    }

    #[test]
    fn test_empty_text_is_all_zero() {
        let features = extract("", None);
        for (_, value) in features.as_map() {
            assert_eq!(value, 0.0);
        }
        assert!(!features.degenerate);
    }

    #[test]
    fn test_bounds_hold_for_varied_inputs() {
        let samples = [
            "좋아요 좋아요 좋아요 좋아요",
            "그 생각이 근거가 있었을까요?",
            "아 짜증나 ㅋㅋㅋㅋㅋ 몰라 몰라",
            "i walked home and it was hard. 요즘은 어떠세요?",
            "...",
        ];
        for sample in samples {
            let features = extract(sample, Some(samples[0]));
            assert_bounded(&features);
        }
    }

    #[test]
    fn test_repeated_single_word_reply() {
        let features = extract("좋아요 좋아요 좋아요 좋아요", None);
        assert_eq!(features.repeated_words, 1.0);
        assert_eq!(features.unique_words, 0.0);
        assert!(!features.degenerate);
    }

    #[test]
    fn test_identical_replies_have_full_semantic_repetition() {
        let text = "변화를 생각할 때 어떤 부담이 드시나요?";
        let features = extract(text, Some(text));
        assert_eq!(features.semantic_repetition, 1.0);
    }

    #[test]
    fn test_determinism() {
        let a = extract("그 생각이 근거가 있었을까요?", Some("이전 응답입니다."));
        let b = extract("그 생각이 근거가 있었을까요?", Some("이전 응답입니다."));
        assert_eq!(a, b);
    }
}
