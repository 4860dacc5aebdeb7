//! Drift policy configuration.
//!
//! Weights, threshold, epsilon band, window size, rollback count, and
//! per-phase turn budgets are configuration, not constants. The defaults
//! below are the canonical set; a TOML file may override any of them.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::phase::{Phase, PhaseRule};

/// Errors raised while loading or validating a drift policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse policy TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid policy: {0}")]
    Invalid(String),
}

/// Per-phase turn budget overrides.
///
/// `None` means "use the phase's built-in default".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnBudgets {
    pub empathy: Option<u32>,
    pub mi: Option<u32>,
    pub cbt1: Option<u32>,
    pub cbt2: Option<u32>,
    pub cbt3: Option<u32>,
}

impl TurnBudgets {
    fn get(&self, phase: Phase) -> Option<u32> {
        match phase {
            Phase::Empathy => self.empathy,
            Phase::Mi => self.mi,
            Phase::Cbt1 => self.cbt1,
            Phase::Cbt2 => self.cbt2,
            Phase::Cbt3 => self.cbt3,
            Phase::Terminal => None,
        }
    }
}

/// The drift policy: scoring weights, thresholds, and window parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftPolicy {
    /// Feature weights for the drift score (feature name → non-negative
    /// weight). Keys without a matching feature contribute 0 and are logged.
    pub weights: BTreeMap<String, f64>,
    /// Score threshold above which the scorer flags drift.
    pub threshold: f64,
    /// Width of the soft-tolerance band just above the threshold.
    pub epsilon: f64,
    /// Whether the soft-tolerance rule is applied after a legitimate
    /// phase change.
    pub soft_tolerance: bool,
    /// Drift window capacity W (most recent outcomes kept, FIFO).
    pub window: usize,
    /// Number of drifting entries within the window that triggers rollback.
    pub rollback_threshold: usize,
    /// Per-phase turn budget overrides.
    pub turn_budgets: TurnBudgets,
}

impl Default for DriftPolicy {
    fn default() -> Self {
        let mut weights = BTreeMap::new();
        weights.insert("repeated_words".to_string(), 0.65);
        weights.insert("style_shift".to_string(), 0.20);
        weights.insert("past_tense".to_string(), 0.10);
        weights.insert("question_ratio".to_string(), 0.07);
        weights.insert("semantic_repetition".to_string(), 0.30);

        Self {
            weights,
            threshold: 0.28,
            epsilon: 0.10,
            soft_tolerance: true,
            window: 5,
            rollback_threshold: 3,
            turn_budgets: TurnBudgets::default(),
        }
    }
}

impl DriftPolicy {
    /// Parse a policy from a TOML string and validate it.
    pub fn from_toml_str(raw: &str) -> Result<Self, PolicyError> {
        let policy: Self = toml::from_str(raw)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Load and validate a policy from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Reject policies that cannot produce meaningful decisions.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if let Some((name, w)) = self.weights.iter().find(|(_, w)| **w < 0.0) {
            return Err(PolicyError::Invalid(format!(
                "weight '{name}' is negative ({w})"
            )));
        }
        if self.window == 0 {
            return Err(PolicyError::Invalid("window must be at least 1".into()));
        }
        if self.rollback_threshold == 0 || self.rollback_threshold > self.window {
            return Err(PolicyError::Invalid(format!(
                "rollback_threshold {} must be in 1..={}",
                self.rollback_threshold, self.window
            )));
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(PolicyError::Invalid("epsilon must be in [0, 1]".into()));
        }
        Ok(())
    }

    /// The turn budget for a phase (override or built-in default).
    pub fn turn_budget(&self, phase: Phase) -> u32 {
        self.turn_budgets
            .get(phase)
            .unwrap_or(PhaseRule::for_phase(phase).default_turn_budget)
    }
}
