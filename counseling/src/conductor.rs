//! Stage conductor — the turn-budgeted state machine over a session.
//!
//! The conductor is the only component that mutates session state, and it
//! does so in a single atomic step per exchange. The API is split in two so
//! that a cancelled generation is a no-op:
//!
//! 1. [`StageConductor::preflight`] — read-only; decides whether the turn is
//!    an intro emission, an empty-input fallback, or a real generation, and
//!    hands back the deterministic inputs the prompt layer needs.
//! 2. [`StageConductor::complete_exchange`] — applies repair, drift
//!    analysis, history, the drift window, and the rollback / advance /
//!    stay decision as one mutation.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::DriftPolicy;
use crate::error::ConductError;
use crate::phase::{is_legal_transition, Phase, PhaseRule};
use crate::repair;
use crate::scorer::{self, DriftRecord};
use crate::session::{ExchangePair, SessionRecord};

/// System notice appended to the reply on a rollback turn.
const ROLLBACK_NOTICE: &str = "[시스템] 상담자의 일관성이 약해져 동기 강화 단계로 돌아갑니다.";

/// Fixed apology emitted when the generation collaborator fails.
const GENERATION_APOLOGY: &str = "죄송합니다. 잠시 문제가 발생했어요. 다시 한 번 말씀해 주시겠어요?";

/// Gentle prompt emitted when the collaborator returns blank text.
const EMPTY_REPLY_RECOVERY: &str = "괜찮아요. 마음을 천천히 들려주셔도 괜찮습니다.";

/// How the generation collaborator's attempt ended.
///
/// The conductor pattern-matches on this instead of catching exceptions; a
/// cancelled generation never reaches it at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// A fully assembled reply.
    Completed(String),
    /// The collaborator failed in a classified way.
    Failed(FailureKind),
}

/// Classified generation failures and their recovery texts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The backend raised an error.
    Backend,
    /// The backend exceeded its own latency bound.
    Timeout,
    /// The backend produced only whitespace.
    EmptyReply,
}

impl FailureKind {
    /// The fixed reply substituted for this failure.
    pub fn recovery_text(self) -> &'static str {
        match self {
            Self::Backend | Self::Timeout => GENERATION_APOLOGY,
            Self::EmptyReply => EMPTY_REPLY_RECOVERY,
        }
    }
}

/// Deterministic inputs for assembling the phase's system instruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationContext {
    pub phase: Phase,
    pub turn_in_phase: u32,
    /// Trailing completed exchange pairs, oldest first.
    pub context_pairs: Vec<ExchangePair>,
    /// The session re-entered Mi from a CBT phase (rollback context).
    pub post_cbt: bool,
    /// The recent window shows a drifting Mi turn; prompts sharpen up.
    pub enhanced: bool,
}

/// What the current turn requires, decided before any generation happens.
#[derive(Debug, Clone, PartialEq)]
pub enum Preflight {
    /// The session is complete; no exchange is possible.
    SessionComplete,
    /// Emit the phase intro; no generation or drift evaluation.
    EmitIntro,
    /// Empty user input; emit the phase fallback prompt.
    EmitFallback,
    /// Run the generation collaborator with this context.
    Generate(GenerationContext),
}

/// Result of one conducted turn.
#[derive(Debug, Clone)]
pub struct ExchangeOutcome {
    /// The text to send to the client.
    pub response: String,
    /// This turn was a rollback announcement, not a normal exchange.
    pub reset_triggered: bool,
    /// The drift record, absent on intro / fallback / failure turns.
    pub drift: Option<DriftRecord>,
}

/// The per-session state machine.
pub struct StageConductor {
    policy: DriftPolicy,
}

impl StageConductor {
    pub fn new(policy: DriftPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DriftPolicy {
        &self.policy
    }

    /// A fresh session at the empathy phase.
    pub fn begin_session(&self, session_id: impl Into<String>) -> SessionRecord {
        SessionRecord::new(session_id)
    }

    /// Decide what this turn requires. Read-only.
    pub fn preflight(&self, record: &SessionRecord, user_input: &str) -> Preflight {
        if record.phase.is_terminal() {
            return Preflight::SessionComplete;
        }
        if record.turn_in_phase == 0 && !record.intro_shown {
            return Preflight::EmitIntro;
        }
        if user_input.trim().is_empty() {
            return Preflight::EmitFallback;
        }

        let depth = context_depth(record.phase);
        Preflight::Generate(GenerationContext {
            phase: record.phase,
            turn_in_phase: record.turn_in_phase,
            context_pairs: record.context_pairs(depth),
            post_cbt: matches!(
                record.rolled_back_from(),
                Some(Phase::Cbt1 | Phase::Cbt2 | Phase::Cbt3)
            ) || record.drift_window.recent_cbt(3),
            enhanced: record.phase == Phase::Mi && record.drift_window.recent_mi_drift(5),
        })
    }

    /// Emit the phase's opening message and mark the intro shown.
    pub fn emit_intro(&self, record: &mut SessionRecord) -> ExchangeOutcome {
        let intro = PhaseRule::for_phase(record.phase).intro;
        record.intro_shown = true;
        record.turn_in_phase = 1;
        record.push_assistant(intro);
        debug!(session = %record.session_id, phase = %record.phase, "intro emitted");
        ExchangeOutcome {
            response: intro.to_string(),
            reset_triggered: false,
            drift: None,
        }
    }

    /// Emit the phase's fallback prompt for empty input. The turn counter
    /// is not advanced and no drift is evaluated.
    pub fn emit_fallback(&self, record: &mut SessionRecord) -> ExchangeOutcome {
        let fallback = PhaseRule::for_phase(record.phase).fallback(record.turn_in_phase);
        record.push_assistant(fallback);
        ExchangeOutcome {
            response: fallback.to_string(),
            reset_triggered: false,
            drift: None,
        }
    }

    /// Apply a completed (or failed) generation as one atomic state step.
    pub fn complete_exchange(
        &self,
        record: &mut SessionRecord,
        user_input: &str,
        outcome: GenerationOutcome,
    ) -> Result<ExchangeOutcome, ConductError> {
        if record.phase.is_terminal() {
            return Err(ConductError::TerminalSession {
                session_id: record.session_id.clone(),
            });
        }

        let raw = match outcome {
            GenerationOutcome::Failed(kind) => {
                let response = kind.recovery_text().to_string();
                record.retry_count += 1;
                record.pending_reply = Some(user_input.to_string());
                record.push_exchange(user_input, &response);
                warn!(
                    session = %record.session_id,
                    phase = %record.phase,
                    kind = ?kind,
                    retry = record.retry_count,
                    "generation failed, apology substituted"
                );
                return Ok(ExchangeOutcome {
                    response,
                    reset_triggered: false,
                    drift: None,
                });
            }
            GenerationOutcome::Completed(raw) => raw,
        };

        record.retry_count = 0;
        record.pending_reply = None;

        let rule = PhaseRule::for_phase(record.phase);
        let previous_assistant = record.last_assistant_text().map(str::to_string);
        let repaired = repair::repair(&raw, previous_assistant.as_deref(), rule);

        let drift_record = scorer::analyze(
            record.phase,
            &repaired.text,
            previous_assistant.as_deref(),
            record.drift_window.last_phase(),
            &self.policy,
        );
        record.drift_window.observe(&drift_record, self.policy.window);
        record.push_exchange(user_input, &repaired.text);

        if record
            .drift_window
            .rollback_due(self.policy.rollback_threshold)
        {
            let from = record.phase;
            self.apply_rollback(record);
            info!(
                session = %record.session_id,
                from = %from,
                score = %format!("{:.3}", drift_record.score),
                "sustained drift, rolling back to mi"
            );
            let response = format!("{}\n\n{}", repaired.text, ROLLBACK_NOTICE);
            return Ok(ExchangeOutcome {
                response,
                reset_triggered: true,
                drift: Some(drift_record),
            });
        }

        let mut response = repaired.text;
        record.turn_in_phase += 1;
        if record.turn_in_phase >= self.policy.turn_budget(record.phase) {
            if let Some(next) = record.phase.successor() {
                debug_assert!(is_legal_transition(record.phase, next));
                info!(
                    session = %record.session_id,
                    from = %record.phase,
                    to = %next,
                    "turn budget exhausted, advancing"
                );
                record.enter_phase(next);
                response.push_str("\n\n");
                response.push_str(rule.closing);
            }
        }

        Ok(ExchangeOutcome {
            response,
            reset_triggered: false,
            drift: Some(drift_record),
        })
    }

    /// Roll the session back to Mi: phase, turn counter, drift window, and
    /// the re-entry intro flag all reset together.
    fn apply_rollback(&self, record: &mut SessionRecord) {
        let from = record.phase;
        debug_assert!(is_legal_transition(from, Phase::Mi));
        record.phase = Phase::Mi;
        record.turn_in_phase = 0;
        record.intro_shown = false;
        record.drift_window.clear();
        record.set_rolled_back_from(Some(from));
    }
}

impl Default for StageConductor {
    fn default() -> Self {
        Self::new(DriftPolicy::default())
    }
}

/// Trailing exchange pairs supplied to the collaborator per phase.
fn context_depth(phase: Phase) -> usize {
    match phase {
        Phase::Mi => 5,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Distinct cbt1-plausible replies with low pairwise overlap.
    const CBT1_REPLIES: [&str; 10] = [
        "요즘 마음속에 어떤 생각이 자주 떠오르나요?",
        "그 감정은 몸 어디에서 느껴지시나요?",
        "비슷한 느낌을 받았던 다른 순간도 있을까요?",
        "지금 떠오른 장면을 조금 더 묘사해 주시겠어요?",
        "그 생각이 행동에 어떤 영향을 주었나요?",
        "처음 그 생각을 알아차린 건 언제였나요?",
        "누군가와 이 감정을 나눈 적이 있으신가요?",
        "그 순간 몸의 반응은 어떠했나요?",
        "하루 중 언제 그 생각이 가장 강해지나요?",
        "그 느낌에 이름을 붙인다면 무엇일까요?",
    ];

    fn conductor() -> StageConductor {
        StageConductor::default()
    }

    fn cbt1_record() -> SessionRecord {
        let mut record = SessionRecord::new("s-test");
        record.phase = Phase::Cbt1;
        record.turn_in_phase = 0;
        record.intro_shown = true;
        record
    }

    #[test]
    fn test_intro_turn_precedes_generation() {
        let conductor = conductor();
        let mut record = conductor.begin_session("s-1");

        assert_eq!(conductor.preflight(&record, "안녕하세요"), Preflight::EmitIntro);
        let outcome = conductor.emit_intro(&mut record);

        assert!(record.intro_shown);
        assert_eq!(record.turn_in_phase, 1);
        assert_eq!(record.history.len(), 1);
        assert!(outcome.drift.is_none());
        assert_eq!(outcome.response, PhaseRule::for_phase(Phase::Empathy).intro);

        // Intro shown: the next turn generates.
        assert!(matches!(
            conductor.preflight(&record, "안녕하세요"),
            Preflight::Generate(_)
        ));
    }

    #[test]
    fn test_empty_input_emits_fallback_without_turn_advance() {
        let conductor = conductor();
        let mut record = cbt1_record();
        record.turn_in_phase = 2;

        assert_eq!(conductor.preflight(&record, "   "), Preflight::EmitFallback);
        let outcome = conductor.emit_fallback(&mut record);

        assert_eq!(record.turn_in_phase, 2);
        assert!(outcome.drift.is_none());
        assert_eq!(
            outcome.response,
            PhaseRule::for_phase(Phase::Cbt1).fallback(2)
        );
        assert_eq!(record.history.len(), 1);
    }

    #[test]
    fn test_turn_budget_exactness() {
        let conductor = conductor();
        let budget = conductor.policy().turn_budget(Phase::Cbt1) as usize;
        let mut record = cbt1_record();

        // budget − 1 clean exchanges must not advance.
        for i in 0..budget - 1 {
            let outcome = conductor
                .complete_exchange(
                    &mut record,
                    "네, 말해볼게요",
                    GenerationOutcome::Completed(CBT1_REPLIES[i].to_string()),
                )
                .unwrap();
            assert!(!outcome.reset_triggered);
            assert_eq!(record.phase, Phase::Cbt1, "advanced early at exchange {i}");
        }

        // The budget-th exchange advances exactly once.
        let outcome = conductor
            .complete_exchange(
                &mut record,
                "네",
                GenerationOutcome::Completed(CBT1_REPLIES[budget - 1].to_string()),
            )
            .unwrap();
        assert_eq!(record.phase, Phase::Cbt2);
        assert_eq!(record.turn_in_phase, 0);
        assert!(!record.intro_shown);
        assert!(outcome
            .response
            .contains(PhaseRule::for_phase(Phase::Cbt1).closing));
    }

    #[test]
    fn test_clean_exchanges_do_not_drift() {
        let conductor = conductor();
        let mut record = cbt1_record();
        for reply in CBT1_REPLIES.iter().take(4) {
            let outcome = conductor
                .complete_exchange(
                    &mut record,
                    "이야기해볼게요",
                    GenerationOutcome::Completed(reply.to_string()),
                )
                .unwrap();
            let drift = outcome.drift.expect("drift record on completed exchange");
            assert!(!drift.drift, "unexpected drift: {:?}", drift.reasons);
        }
        assert_eq!(record.drift_window.drift_count(), 0);
    }

    #[test]
    fn test_sustained_drift_rolls_back_atomically() {
        let conductor = conductor();
        let mut record = cbt1_record();
        let history_before_rollback = 3 * 2; // three full exchanges

        let mut last = None;
        for _ in 0..3 {
            last = Some(
                conductor
                    .complete_exchange(
                        &mut record,
                        "네",
                        GenerationOutcome::Completed("좋아요 좋아요 좋아요 좋아요".to_string()),
                    )
                    .unwrap(),
            );
        }
        let outcome = last.unwrap();

        // Rollback observed all together: phase, turn, window, notice.
        assert!(outcome.reset_triggered);
        assert_eq!(record.phase, Phase::Mi);
        assert_eq!(record.turn_in_phase, 0);
        assert!(record.drift_window.is_empty());
        assert!(!record.intro_shown);
        assert!(outcome.response.contains("[시스템]"));

        // History survives rollback (window-only clearing policy).
        assert_eq!(record.history.len(), history_before_rollback);

        // The next turn re-enters Mi through its intro.
        assert_eq!(conductor.preflight(&record, "네"), Preflight::EmitIntro);
    }

    #[test]
    fn test_interrupted_drift_does_not_roll_back() {
        let conductor = conductor();
        let mut record = cbt1_record();

        let drifty = "좋아요 좋아요 좋아요 좋아요";
        for (i, reply) in [drifty, CBT1_REPLIES[0], drifty, CBT1_REPLIES[1]]
            .iter()
            .enumerate()
        {
            let outcome = conductor
                .complete_exchange(
                    &mut record,
                    "네",
                    GenerationOutcome::Completed(reply.to_string()),
                )
                .unwrap();
            assert!(!outcome.reset_triggered, "rolled back at exchange {i}");
        }
        assert_eq!(record.phase, Phase::Cbt1);
    }

    #[test]
    fn test_generation_failure_substitutes_apology() {
        let conductor = conductor();
        let mut record = cbt1_record();
        record.turn_in_phase = 2;

        let outcome = conductor
            .complete_exchange(
                &mut record,
                "요즘 생각이 많아요",
                GenerationOutcome::Failed(FailureKind::Backend),
            )
            .unwrap();

        assert_eq!(outcome.response, GENERATION_APOLOGY);
        assert_eq!(record.turn_in_phase, 2, "failures must not advance the turn");
        assert_eq!(record.retry_count, 1);
        assert!(outcome.drift.is_none());
        assert_eq!(record.drift_window.len(), 0);
    }

    #[test]
    fn test_empty_reply_recovery_text() {
        let conductor = conductor();
        let mut record = cbt1_record();
        let outcome = conductor
            .complete_exchange(
                &mut record,
                "네",
                GenerationOutcome::Failed(FailureKind::EmptyReply),
            )
            .unwrap();
        assert_eq!(outcome.response, EMPTY_REPLY_RECOVERY);
    }

    #[test]
    fn test_duplicate_reply_is_substituted_before_scoring() {
        let conductor = conductor();
        let mut record = cbt1_record();
        let reply = CBT1_REPLIES[0];

        conductor
            .complete_exchange(
                &mut record,
                "네",
                GenerationOutcome::Completed(reply.to_string()),
            )
            .unwrap();
        let outcome = conductor
            .complete_exchange(
                &mut record,
                "음",
                GenerationOutcome::Completed(reply.to_string()),
            )
            .unwrap();

        let repaired = outcome.response;
        assert_ne!(repaired.split("\n\n").next().unwrap(), reply);
        assert_eq!(
            record.last_assistant_text().unwrap(),
            PhaseRule::for_phase(Phase::Cbt1).rephrase
        );
    }

    #[test]
    fn test_cancelled_generation_is_a_no_op() {
        let conductor = conductor();
        let mut record = cbt1_record();
        record.push_exchange("u", "a");
        let snapshot = record.clone();

        // The caller ran preflight, started generation, and cancelled it:
        // complete_exchange is never called, so nothing changed.
        let preflight = conductor.preflight(&record, "생각이 많아요");
        assert!(matches!(preflight, Preflight::Generate(_)));
        assert_eq!(record, snapshot);
    }

    #[test]
    fn test_terminal_refuses_exchanges() {
        let conductor = conductor();
        let mut record = SessionRecord::new("s-done");
        record.phase = Phase::Terminal;

        assert_eq!(
            conductor.preflight(&record, "안녕하세요"),
            Preflight::SessionComplete
        );
        let err = conductor
            .complete_exchange(
                &mut record,
                "안녕하세요",
                GenerationOutcome::Completed("응답".to_string()),
            )
            .unwrap_err();
        assert!(matches!(err, ConductError::TerminalSession { .. }));
    }

    #[test]
    fn test_mi_context_flags_after_rollback() {
        let conductor = conductor();
        let mut record = cbt1_record();
        for _ in 0..3 {
            conductor
                .complete_exchange(
                    &mut record,
                    "네",
                    GenerationOutcome::Completed("좋아요 좋아요 좋아요 좋아요".to_string()),
                )
                .unwrap();
        }
        assert_eq!(record.phase, Phase::Mi);

        conductor.emit_intro(&mut record);
        let preflight = conductor.preflight(&record, "다시 해볼게요");
        match preflight {
            Preflight::Generate(ctx) => {
                assert!(ctx.post_cbt, "mi re-entry after cbt rollback");
                assert!(!ctx.enhanced);
            }
            other => panic!("expected Generate, got {other:?}"),
        }
    }

    #[test]
    fn test_context_depth_by_phase() {
        let conductor = conductor();
        let mut record = SessionRecord::new("s-1");
        record.phase = Phase::Mi;
        record.intro_shown = true;
        record.turn_in_phase = 1;
        for i in 0..7 {
            record.push_exchange(format!("u{i}"), format!("a{i}"));
        }

        match conductor.preflight(&record, "네") {
            Preflight::Generate(ctx) => assert_eq!(ctx.context_pairs.len(), 5),
            other => panic!("expected Generate, got {other:?}"),
        }

        record.phase = Phase::Cbt2;
        match conductor.preflight(&record, "네") {
            Preflight::Generate(ctx) => assert_eq!(ctx.context_pairs.len(), 1),
            other => panic!("expected Generate, got {other:?}"),
        }
    }

    #[test]
    fn test_window_capacity_respected_under_long_sessions() {
        let conductor = conductor();
        let mut record = cbt1_record();
        // Alternate drift and clean replies; never three drifting in window.
        for i in 0..12 {
            let reply = if i % 3 == 0 {
                "좋아요 좋아요 좋아요 좋아요"
            } else {
                CBT1_REPLIES[i % CBT1_REPLIES.len()]
            };
            let _ = conductor.complete_exchange(
                &mut record,
                "네",
                GenerationOutcome::Completed(reply.to_string()),
            );
            assert!(record.drift_window.len() <= conductor.policy().window);
        }
    }

    #[test]
    fn test_unanimous_short_window_policy() {
        let mut policy = DriftPolicy::default();
        policy.window = 3;
        policy.rollback_threshold = 3;
        let conductor = StageConductor::new(policy);
        let mut record = cbt1_record();

        let mut reset = false;
        for _ in 0..3 {
            let outcome = conductor
                .complete_exchange(
                    &mut record,
                    "네",
                    GenerationOutcome::Completed("좋아요 좋아요 좋아요 좋아요".to_string()),
                )
                .unwrap();
            reset = outcome.reset_triggered;
        }
        assert!(reset);
        assert_eq!(record.phase, Phase::Mi);
    }
}
