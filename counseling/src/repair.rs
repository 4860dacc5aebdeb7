//! Reply repair — light normalization applied once before scoring.
//!
//! Repairs: duplicate-sentence removal inside the reply, a clarifying
//! question when the reply lacks a sentence-final form, a gentle
//! encouragement for very short replies, and substitution of a fixed
//! rephrase sentence when the reply duplicates the previous one verbatim.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::phase::PhaseRule;

static SENTENCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^.!?]*[.!?]?").expect("sentence pattern"));

/// Korean polite sentence-final forms (다. / 요. / 죠? / 나요? / 까요? /
/// 습니까? families), with or without trailing punctuation.
static FINAL_FORM_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[다요죠까][.?!]?$").expect("final form pattern"));

const ENCOURAGEMENT: &str = "천천히 더 이야기해 주셔도 괜찮습니다.";

const SHORT_REPLY_CHARS: usize = 20;

/// A repaired reply, with flags recording what was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repaired {
    pub text: String,
    /// The reply duplicated the previous assistant utterance and was
    /// replaced by the phase's rephrase sentence.
    pub substituted: bool,
}

/// Remove sentences that repeat earlier sentences of the same reply,
/// ignoring whitespace differences.
fn dedupe_sentences(text: &str) -> String {
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    for m in SENTENCE_PATTERN.find_iter(text) {
        let sentence = m.as_str().trim();
        if sentence.is_empty() {
            continue;
        }
        let key: String = sentence.chars().filter(|c| !c.is_whitespace()).collect();
        if seen.insert(key) {
            kept.push(sentence);
        }
    }
    kept.join(" ")
}

fn ends_in_final_form(text: &str) -> bool {
    FINAL_FORM_PATTERN.is_match(text.trim_end())
}

/// Apply the repair policy to an assembled reply.
///
/// The substituted rephrase sentence is never itself re-checked against the
/// previous utterance.
pub fn repair(reply: &str, previous_assistant: Option<&str>, rule: &PhaseRule) -> Repaired {
    let mut text = dedupe_sentences(reply.trim());

    if !text.is_empty() && !ends_in_final_form(&text) {
        text.push(' ');
        text.push_str(rule.clarifier);
    }

    if let Some(previous) = previous_assistant {
        if text == previous.trim() {
            return Repaired {
                text: rule.rephrase.to_string(),
                substituted: true,
            };
        }
    }

    if text.trim().chars().count() < SHORT_REPLY_CHARS {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(ENCOURAGEMENT);
    }

    Repaired {
        text,
        substituted: false,
    }
}
