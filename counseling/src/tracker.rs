//! Drift history tracking — the capped window of recent outcomes and the
//! rollback decision derived from it.
//!
//! This is the sole authority for triggering rollback. Turn-budget
//! exhaustion is the conductor's separate concern and never appears here.

use serde::{Deserialize, Serialize};

use crate::phase::Phase;
use crate::scorer::DriftRecord;

/// One retained drift outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowEntry {
    pub phase: Phase,
    pub drift: bool,
}

/// Capped FIFO window of recent drift outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriftWindow {
    entries: Vec<WindowEntry>,
}

impl DriftWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[WindowEntry] {
        &self.entries
    }

    /// The phase of the most recent entry, used by the scorer's
    /// soft-tolerance rule.
    pub fn last_phase(&self) -> Option<Phase> {
        self.entries.last().map(|e| e.phase)
    }

    /// Append an outcome, evicting the oldest entries beyond `capacity`.
    pub fn observe(&mut self, record: &DriftRecord, capacity: usize) {
        self.entries.push(WindowEntry {
            phase: record.phase,
            drift: record.drift,
        });
        if self.entries.len() > capacity {
            let excess = self.entries.len() - capacity;
            self.entries.drain(..excess);
        }
    }

    /// Number of drifting entries currently retained.
    pub fn drift_count(&self) -> usize {
        self.entries.iter().filter(|e| e.drift).count()
    }

    /// Whether any of the `n` most recent entries is a drifting Mi turn.
    ///
    /// Drives the "enhanced" Mi re-entry prompt.
    pub fn recent_mi_drift(&self, n: usize) -> bool {
        self.entries
            .iter()
            .rev()
            .take(n)
            .any(|e| e.phase == Phase::Mi && e.drift)
    }

    /// Whether any of the `n` most recent entries came from a CBT phase.
    ///
    /// Drives the Mi prompt's post-CBT context selection after a rollback.
    pub fn recent_cbt(&self, n: usize) -> bool {
        self.entries
            .iter()
            .rev()
            .take(n)
            .any(|e| matches!(e.phase, Phase::Cbt1 | Phase::Cbt2 | Phase::Cbt3))
    }

    /// Rollback decision: true iff the retained window holds at least
    /// `rollback_threshold` drifting entries.
    pub fn rollback_due(&self, rollback_threshold: usize) -> bool {
        self.drift_count() >= rollback_threshold
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
