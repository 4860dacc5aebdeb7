//! Counseling phases — explicit states and legal transition guards.
//!
//! The dialogue moves through five ordered phases (empathic opening,
//! motivational interviewing, three CBT sub-phases) into a terminal state.
//! Every transition is validated against the table in [`is_legal_transition`];
//! rollback edges lead back to [`Phase::Mi`] from any later phase.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The set of counseling phases.
///
/// Ordered progression: Empathy → Mi → Cbt1 → Cbt2 → Cbt3 → Terminal.
/// Mi is additionally reachable by rollback from Mi and every CBT phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Empathic opening — rapport and emotional validation.
    Empathy,
    /// Motivational interviewing — change talk and ambivalence.
    Mi,
    /// CBT 1 — surfacing automatic thoughts and emotions.
    Cbt1,
    /// CBT 2 — challenging distortions and weighing evidence.
    Cbt2,
    /// CBT 3 — action plans and obstacle handling.
    Cbt3,
    /// Session complete — no outgoing transitions.
    Terminal,
}

impl Phase {
    /// All non-terminal phases in progression order.
    pub const ACTIVE: [Phase; 5] = [
        Phase::Empathy,
        Phase::Mi,
        Phase::Cbt1,
        Phase::Cbt2,
        Phase::Cbt3,
    ];

    /// Whether this is the terminal phase (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminal)
    }

    /// The next phase in the ordered progression.
    pub fn successor(self) -> Option<Phase> {
        match self {
            Self::Empathy => Some(Self::Mi),
            Self::Mi => Some(Self::Cbt1),
            Self::Cbt1 => Some(Self::Cbt2),
            Self::Cbt2 => Some(Self::Cbt3),
            Self::Cbt3 => Some(Self::Terminal),
            Self::Terminal => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empathy => write!(f, "empathy"),
            Self::Mi => write!(f, "mi"),
            Self::Cbt1 => write!(f, "cbt1"),
            Self::Cbt2 => write!(f, "cbt2"),
            Self::Cbt3 => write!(f, "cbt3"),
            Self::Terminal => write!(f, "terminal"),
        }
    }
}

/// Legal transitions between phases.
///
/// The transition table encodes the valid edges in the phase graph:
/// ```text
/// Empathy → Mi
/// Mi      → Cbt1 | Mi (rollback)
/// Cbt1    → Cbt2 | Mi (rollback)
/// Cbt2    → Cbt3 | Mi (rollback)
/// Cbt3    → Terminal | Mi (rollback)
/// ```
pub fn is_legal_transition(from: Phase, to: Phase) -> bool {
    use Phase::*;

    // Rollback: Mi is reachable from itself and any later phase.
    if to == Mi && matches!(from, Mi | Cbt1 | Cbt2 | Cbt3) {
        return true;
    }

    matches!(
        (from, to),
        (Empathy, Mi) | (Mi, Cbt1) | (Cbt1, Cbt2) | (Cbt2, Cbt3) | (Cbt3, Terminal)
    )
}

/// Whether `previous` admits a forward transition into `current`.
///
/// Used by the scorer's soft-tolerance rule: scores in the epsilon band just
/// above the threshold are forgiven right after a legitimate phase change.
pub fn admits_transition(previous: Phase, current: Phase) -> bool {
    use Phase::*;
    matches!(
        (previous, current),
        (Empathy, Mi) | (Mi, Cbt1) | (Cbt1, Cbt2) | (Cbt2, Cbt3)
    )
}

/// Static per-phase dialogue texts and the phase's default turn budget.
///
/// The budget here is the built-in default; [`crate::config::DriftPolicy`]
/// may override it per phase.
pub struct PhaseRule {
    /// Opening message emitted on the phase's first turn.
    pub intro: &'static str,
    /// Fallback prompts for empty input, indexed by turn (clamped).
    pub fallbacks: &'static [&'static str],
    /// Remark appended to the reply when the phase's budget is exhausted.
    pub closing: &'static str,
    /// Clarifying question appended by repair when a reply lacks a
    /// sentence-final form.
    pub clarifier: &'static str,
    /// Substitute sentence used when a reply duplicates the previous one.
    pub rephrase: &'static str,
    /// Exchanges the phase permits before advancing.
    pub default_turn_budget: u32,
}

impl PhaseRule {
    /// Look up the rule for a phase.
    pub fn for_phase(phase: Phase) -> &'static PhaseRule {
        match phase {
            Phase::Empathy => &EMPATHY_RULE,
            Phase::Mi => &MI_RULE,
            Phase::Cbt1 => &CBT1_RULE,
            Phase::Cbt2 => &CBT2_RULE,
            Phase::Cbt3 => &CBT3_RULE,
            Phase::Terminal => &TERMINAL_RULE,
        }
    }

    /// The fallback prompt for an empty-input turn.
    pub fn fallback(&self, turn_in_phase: u32) -> &'static str {
        if self.fallbacks.is_empty() {
            return self.clarifier;
        }
        let idx = (turn_in_phase.saturating_sub(1) as usize).min(self.fallbacks.len() - 1);
        self.fallbacks[idx]
    }
}

static EMPATHY_RULE: PhaseRule = PhaseRule {
    intro: "안녕하세요, 와 주셔서 감사합니다. 요즘 어떻게 지내셨는지, 편하신 만큼 이야기해 주시겠어요?",
    fallbacks: &["조금만 더 이야기해 주실 수 있을까요?"],
    closing: "지금까지 이야기 나눠 주셔서 감사합니다. 이제 변화에 대한 마음을 함께 들여다보겠습니다.",
    clarifier: "괜찮으셨을까요?",
    rephrase: "제가 조금 다르게 다시 말씀드려볼게요.",
    default_turn_budget: 5,
};

static MI_RULE: PhaseRule = PhaseRule {
    intro: "지금부터는 변화에 대한 마음을 함께 살펴보려고 해요. 바꾸고 싶은 것과 망설여지는 것, 어느 쪽이든 편하게 말씀해 주세요.",
    fallbacks: &["조금 더 구체적으로 말씀해주실 수 있을까요?"],
    closing: "좋습니다. 이제 생각과 감정의 흐름을 함께 살펴보겠습니다.",
    clarifier: "어떻게 생각하세요?",
    rephrase: "제가 조금 다르게 다시 여쭤볼게요.",
    default_turn_budget: 5,
};

static CBT1_RULE: PhaseRule = PhaseRule {
    intro: "안녕하세요. 지금부터는 최근의 감정, 생각, 행동 흐름을 함께 점검해보겠습니다. 편하게 시작해볼까요? 최근 어떤 감정이나 생각이 가장 먼저 떠오르셨나요?",
    fallbacks: &[
        "최근 어떤 감정이나 생각이 가장 먼저 떠오르셨나요?",
        "그 생각이 왜 그렇게 들었는지, 이유가 무엇일까요?",
        "그런 감정이 행동에 어떤 영향을 미쳤을까요?",
        "그 생각을 계속 믿는다면 어떤 결과가 생길까요?",
        "그 생각을 다른 방식으로 해석할 수 있을까요?",
    ],
    closing: "좋습니다. 이제 다음 단계에서 인지 기술을 함께 연습해보겠습니다.",
    clarifier: "이 부분에 대해 어떻게 생각하세요?",
    rephrase: "조금 다른 방식으로 다시 질문드려볼게요.",
    default_turn_budget: 5,
};

static CBT2_RULE: PhaseRule = PhaseRule {
    intro: "이제부터는 자동사고와 인지 왜곡을 함께 점검해볼 거예요. 최근 반복되거나 강하게 떠올랐던 생각이 있다면 공유해 주시겠어요?",
    fallbacks: &["최근 반복되거나 강하게 떠올랐던 생각이 있다면 공유해 주시겠어요?"],
    closing: "아주 잘 하셨어요. 이제 마지막 단계에서 실천 계획을 세워보겠습니다.",
    clarifier: "어떻게 생각하세요?",
    rephrase: "이번에는 조금 다른 관점에서 다시 질문드려볼게요.",
    default_turn_budget: 10,
};

static CBT3_RULE: PhaseRule = PhaseRule {
    intro: "이제 마지막 단계입니다. 이번 주에 실천할 수 있는 과제를 함께 정하고, 예상되는 방해요소나 고위험 상황에 대한 대처 계획도 세워볼 거예요.",
    fallbacks: &["이번 주에 어떤 행동을 실천해볼 수 있을까요?"],
    closing: "실천을 위한 준비가 완료되었습니다. 수고하셨습니다!",
    clarifier: "이 계획이 현실적으로 가능할까요?",
    rephrase: "같은 주제로 조금 더 구체적으로 계획해볼까요?",
    default_turn_budget: 6,
};

static TERMINAL_RULE: PhaseRule = PhaseRule {
    intro: "지금까지 함께해 주셔서 감사합니다. 상담을 마무리하겠습니다.",
    fallbacks: &[],
    closing: "",
    clarifier: "",
    rephrase: "",
    default_turn_budget: 0,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progression_order() {
        assert_eq!(Phase::Empathy.successor(), Some(Phase::Mi));
        assert_eq!(Phase::Mi.successor(), Some(Phase::Cbt1));
        assert_eq!(Phase::Cbt1.successor(), Some(Phase::Cbt2));
        assert_eq!(Phase::Cbt2.successor(), Some(Phase::Cbt3));
        assert_eq!(Phase::Cbt3.successor(), Some(Phase::Terminal));
        assert_eq!(Phase::Terminal.successor(), None);
    }

    #[test]
    fn test_forward_transitions_are_legal() {
        for phase in Phase::ACTIVE {
            let next = phase.successor().unwrap();
            assert!(is_legal_transition(phase, next), "{phase} → {next}");
        }
    }

    #[test]
    fn test_rollback_reaches_mi_from_later_phases() {
        for phase in [Phase::Mi, Phase::Cbt1, Phase::Cbt2, Phase::Cbt3] {
            assert!(is_legal_transition(phase, Phase::Mi), "{phase} → mi");
        }
    }

    #[test]
    fn test_terminal_has_no_outgoing_edges() {
        for to in Phase::ACTIVE {
            assert!(!is_legal_transition(Phase::Terminal, to));
        }
        assert!(!is_legal_transition(Phase::Terminal, Phase::Terminal));
    }

    #[test]
    fn test_skips_and_backward_edges_are_illegal() {
        assert!(!is_legal_transition(Phase::Empathy, Phase::Cbt1));
        assert!(!is_legal_transition(Phase::Cbt1, Phase::Empathy));
        assert!(!is_legal_transition(Phase::Cbt3, Phase::Cbt1));
    }

    #[test]
    fn test_admits_transition_follows_source_table() {
        assert!(admits_transition(Phase::Empathy, Phase::Mi));
        assert!(admits_transition(Phase::Cbt2, Phase::Cbt3));
        assert!(!admits_transition(Phase::Cbt3, Phase::Terminal));
        assert!(!admits_transition(Phase::Mi, Phase::Mi));
    }

    #[test]
    fn test_fallback_indexing_clamps() {
        let rule = PhaseRule::for_phase(Phase::Cbt1);
        assert_eq!(rule.fallback(0), rule.fallbacks[0]);
        assert_eq!(rule.fallback(1), rule.fallbacks[0]);
        assert_eq!(rule.fallback(3), rule.fallbacks[2]);
        assert_eq!(rule.fallback(99), rule.fallbacks[4]);
    }

    #[test]
    fn test_serde_wire_names() {
        assert_eq!(serde_json::to_string(&Phase::Cbt1).unwrap(), "\"cbt1\"");
        let p: Phase = serde_json::from_str("\"mi\"").unwrap();
        assert_eq!(p, Phase::Mi);
    }
}
