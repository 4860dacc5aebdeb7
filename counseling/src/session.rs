//! The session record and the transport-facing exchange payloads.
//!
//! A `SessionRecord` is exclusively owned by the stage conductor for the
//! session's lifetime; the transport layer sees only the serialized
//! request/response shapes defined here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DriftPolicy;
use crate::error::ConductError;
use crate::phase::Phase;
use crate::tracker::DriftWindow;

/// Who produced an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

/// One history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: Speaker,
    pub text: String,
}

impl Utterance {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
        }
    }
}

/// A completed user/assistant exchange pair, for generation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangePair {
    pub user: String,
    pub assistant: String,
}

/// Per-session state, mutated only by the stage conductor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub phase: Phase,
    pub turn_in_phase: u32,
    pub history: Vec<Utterance>,
    pub drift_window: DriftWindow,
    pub intro_shown: bool,
    #[serde(default)]
    pub pending_reply: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    /// The phase a rollback departed from, until the next forward
    /// transition. Drives the Mi re-entry prompt context.
    #[serde(default)]
    rolled_back_from: Option<Phase>,
    pub last_activity: DateTime<Utc>,
}

impl SessionRecord {
    /// A fresh session at the empathy phase.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            phase: Phase::Empathy,
            turn_in_phase: 0,
            history: Vec::new(),
            drift_window: DriftWindow::new(),
            intro_shown: false,
            pending_reply: None,
            retry_count: 0,
            rolled_back_from: None,
            last_activity: Utc::now(),
        }
    }

    /// The phase the last rollback departed from, if the session has not
    /// moved forward since.
    pub fn rolled_back_from(&self) -> Option<Phase> {
        self.rolled_back_from
    }

    pub fn set_rolled_back_from(&mut self, from: Option<Phase>) {
        self.rolled_back_from = from;
    }

    /// Enter a phase through a forward transition: the turn counter and the
    /// intro flag reset, and any rollback context is consumed.
    pub fn enter_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.turn_in_phase = 0;
        self.intro_shown = false;
        self.rolled_back_from = None;
        self.last_activity = Utc::now();
    }

    /// The most recent assistant utterance, if any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|u| u.speaker == Speaker::Assistant)
            .map(|u| u.text.as_str())
    }

    /// Append a lone assistant utterance (intro or fallback turn).
    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.history.push(Utterance::assistant(text));
        self.last_activity = Utc::now();
    }

    /// Append a completed user/assistant exchange.
    pub fn push_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.history.push(Utterance::user(user));
        self.history.push(Utterance::assistant(assistant));
        self.last_activity = Utc::now();
    }

    /// The trailing `n` completed exchange pairs, oldest first.
    pub fn context_pairs(&self, n: usize) -> Vec<ExchangePair> {
        let mut pairs = Vec::new();
        let mut pending_user: Option<&str> = None;
        for utterance in &self.history {
            match utterance.speaker {
                Speaker::User => pending_user = Some(utterance.text.as_str()),
                Speaker::Assistant => {
                    if let Some(user) = pending_user.take() {
                        pairs.push(ExchangePair {
                            user: user.to_string(),
                            assistant: utterance.text.clone(),
                        });
                    }
                }
            }
        }
        let skip = pairs.len().saturating_sub(n);
        pairs.split_off(skip)
    }
}

/// Inbound exchange payload from the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRequest {
    pub session_id: String,
    pub phase: Phase,
    pub question: String,
    #[serde(default)]
    pub history: Vec<Utterance>,
    #[serde(default)]
    pub turn_in_phase: u32,
    #[serde(default)]
    pub drift_window: DriftWindow,
    #[serde(default)]
    pub intro_shown: bool,
    #[serde(default)]
    pub pending_reply: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

impl ExchangeRequest {
    /// Validate the payload against the policy and rebuild the session
    /// record it describes.
    pub fn into_record(self, policy: &DriftPolicy) -> Result<SessionRecord, ConductError> {
        if self.session_id.trim().is_empty() {
            return Err(ConductError::malformed("empty session_id"));
        }
        if self.drift_window.len() > policy.window {
            return Err(ConductError::malformed(format!(
                "drift window holds {} entries, capacity is {}",
                self.drift_window.len(),
                policy.window
            )));
        }
        let budget = policy.turn_budget(self.phase);
        if !self.phase.is_terminal() && self.turn_in_phase > budget {
            return Err(ConductError::malformed(format!(
                "turn {} exceeds the {} budget of {budget}",
                self.turn_in_phase, self.phase
            )));
        }

        Ok(SessionRecord {
            session_id: self.session_id,
            phase: self.phase,
            turn_in_phase: self.turn_in_phase,
            history: self.history,
            drift_window: self.drift_window,
            intro_shown: self.intro_shown,
            pending_reply: self.pending_reply,
            retry_count: self.retry_count,
            rolled_back_from: None,
            last_activity: Utc::now(),
        })
    }
}

/// Outbound exchange payload to the transport layer.
///
/// `reset_triggered` marks a rollback announcement: the client should treat
/// `response` as a system notice rather than a normal counselor turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeResponse {
    pub next_phase: Phase,
    pub turn_in_phase: u32,
    pub response: String,
    pub history: Vec<Utterance>,
    pub drift_window: DriftWindow,
    pub reset_triggered: bool,
    pub intro_shown: bool,
}

impl ExchangeResponse {
    /// Snapshot a record after an exchange.
    pub fn from_record(record: &SessionRecord, response: String, reset_triggered: bool) -> Self {
        Self {
            next_phase: record.phase,
            turn_in_phase: record.turn_in_phase,
            response,
            history: record.history.clone(),
            drift_window: record.drift_window.clone(),
            reset_triggered,
            intro_shown: record.intro_shown,
        }
    }
}
