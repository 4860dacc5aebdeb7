//! Lexical surface features: repetition, uniqueness, register shift,
//! question density, and the degenerate-text check.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+").expect("word pattern"));

static SENTENCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^.!?]*[.!?]?").expect("sentence pattern"));

static FILLER_RUN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ㅋㅎㅠㅜ]{4,}").expect("filler run pattern"));

static LAUGHTER_TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ㅋㅎㅠㅜ]+$").expect("laughter token pattern"));

/// Slang / laughter glyph runs scored as register shift.
static SLANG_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"ㅋ{2,}", r"ㅎ{2,}", r"ㅠ{2,}", r"ㅜ{2,}", r"ㄷ{2,}", r"ㄱ{2,}"]
        .iter()
        .map(|p| Regex::new(p).expect("slang pattern"))
        .collect()
});

/// Aggressive-register markers checked by substring containment.
const AGGRESSIVE_MARKERS: [&str; 5] = ["짜증", "됐어", "죽겠어", "어쩌라고", "몰라"];

/// Slang tokens counted per word.
const SLANG_TOKENS: [&str; 8] = ["ㅋㅋ", "ㅎㅎ", "ㅠㅠ", "ㅜㅜ", "헐", "대박", "쩐다", "실화냐"];

/// Lowercased word tokens (Unicode-aware, so Hangul words count).
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    WORD_PATTERN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn word_counts(tokens: &[String]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for token in tokens {
        *counts.entry(token.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Fraction of word occurrences that appear at least twice.
pub fn fraction_repeated_words(text: &str) -> f64 {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return 0.0;
    }
    let counts = word_counts(&tokens);
    let repeated: usize = counts.values().filter(|c| **c >= 2).sum();
    repeated as f64 / tokens.len() as f64
}

/// Fraction of word occurrences that appear exactly once.
pub fn fraction_unique_words(text: &str) -> f64 {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return 0.0;
    }
    let counts = word_counts(&tokens);
    let unique = counts.values().filter(|c| **c == 1).count();
    unique as f64 / tokens.len() as f64
}

/// Fraction of slang / aggressive-register matches per word.
pub fn fraction_style_shift(text: &str) -> f64 {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return 0.0;
    }

    let slang_words = tokens
        .iter()
        .filter(|t| SLANG_TOKENS.contains(&t.as_str()))
        .count();
    let aggressive = AGGRESSIVE_MARKERS
        .iter()
        .filter(|m| text.contains(**m))
        .count();
    let glyph_runs: usize = SLANG_PATTERNS
        .iter()
        .map(|p| p.find_iter(text).count())
        .sum();

    let fraction = (slang_words + aggressive + glyph_runs) as f64 / tokens.len() as f64;
    fraction.min(1.0)
}

/// Fraction of sentence-like segments that are questions.
///
/// Segments are split on terminal punctuation with the terminator kept, so
/// `"괜찮아요?"` counts as one question segment.
pub fn fraction_question_sentences(text: &str) -> f64 {
    let mut total = 0usize;
    let mut questions = 0usize;
    for m in SENTENCE_PATTERN.find_iter(text) {
        let segment = m.as_str().trim();
        if segment.is_empty() {
            continue;
        }
        total += 1;
        if segment.contains('?') {
            questions += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    questions as f64 / total as f64
}

/// Whether the text is structurally meaningless.
///
/// True for: a run of five or more identical characters, a run of four or
/// more filler glyphs, an extremely short reply dominated by punctuation,
/// or text composed solely of laughter tokens.
pub fn is_degenerate(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }

    if has_identical_run(trimmed, 5) {
        return true;
    }

    if FILLER_RUN_PATTERN.is_match(trimmed) {
        return true;
    }

    let visible: Vec<char> = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if visible.len() <= 4 {
        let symbols = visible.iter().filter(|c| !c.is_alphanumeric()).count();
        if symbols * 2 >= visible.len() {
            return true;
        }
    }

    let tokens = tokenize(trimmed);
    !tokens.is_empty()
        && tokens
            .iter()
            .all(|t| LAUGHTER_TOKEN_PATTERN.is_match(t))
}

fn has_identical_run(text: &str, min_len: usize) -> bool {
    let mut run = 0usize;
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if Some(c) == prev {
            run += 1;
        } else {
            run = 1;
            prev = Some(c);
        }
        if run >= min_len {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_words_all_same() {
        // Single word repeated four times: every occurrence is repeated.
        assert_eq!(fraction_repeated_words("좋아요 좋아요 좋아요 좋아요"), 1.0);
    }

    #[test]
    fn test_repeated_and_unique_partition() {
        let text = "오늘 오늘 기분 어땠나요";
        let repeated = fraction_repeated_words(text);
        let unique = fraction_unique_words(text);
        assert!((repeated - 0.5).abs() < 1e-9);
        assert!((unique - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_text_yields_zero() {
        assert_eq!(fraction_repeated_words(""), 0.0);
        assert_eq!(fraction_unique_words("   "), 0.0);
        assert_eq!(fraction_style_shift(""), 0.0);
        assert_eq!(fraction_question_sentences(""), 0.0);
    }

    #[test]
    fn test_style_shift_counts_slang_and_aggression() {
        assert!(fraction_style_shift("아 짜증 몰라 ㅋㅋㅋ") > 0.0);
        assert_eq!(fraction_style_shift("오늘 기분이 차분했어요"), 0.0);
    }

    #[test]
    fn test_question_fraction_sees_terminators() {
        assert_eq!(fraction_question_sentences("괜찮으셨나요?"), 1.0);
        assert_eq!(
            fraction_question_sentences("힘드셨겠어요. 요즘은 어떠세요?"),
            0.5
        );
        assert_eq!(fraction_question_sentences("힘드셨겠어요."), 0.0);
    }

    #[test]
    fn test_degenerate_identical_run() {
        assert!(is_degenerate("aaaaa"));
        assert!(is_degenerate("ㅋㅋㅋㅋㅋ 재밌다"));
        assert!(!is_degenerate("그 생각이 근거가 있었을까요?"));
    }

    #[test]
    fn test_degenerate_filler_run() {
        assert!(is_degenerate("ㅋㅎㅠㅜ"));
    }

    #[test]
    fn test_degenerate_short_symbolic() {
        assert!(is_degenerate("..."));
        assert!(is_degenerate("?!"));
        assert!(!is_degenerate("네네"));
    }

    #[test]
    fn test_degenerate_pure_laughter() {
        assert!(is_degenerate("ㅋㅋ ㅎㅎ ㅠㅠ"));
        assert!(!is_degenerate("ㅋㅋ 오늘은 괜찮았어요"));
    }

    #[test]
    fn test_empty_not_degenerate() {
        assert!(!is_degenerate(""));
        assert!(!is_degenerate("   "));
    }
}
