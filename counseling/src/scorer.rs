//! Drift scoring — weighted feature combination plus the per-phase probe.
//!
//! All decisions here are deterministic: identical inputs produce identical
//! verdicts on every call. Configuration mismatches between the weight map
//! and the feature set are warnings, never failures.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::DriftPolicy;
use crate::features::{self, FeatureVector};
use crate::phase::{admits_transition, Phase};
use crate::probe::{self, ProbeOutcome};

/// A signal that contributed to a drift verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftReason {
    /// The weighted score exceeded the threshold.
    ScoreThreshold,
    /// The phase's plausibility probe rejected the reply.
    ProbeFailed,
    /// The reply was structurally meaningless.
    DegenerateInput,
}

impl std::fmt::Display for DriftReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScoreThreshold => write!(f, "score_threshold"),
            Self::ProbeFailed => write!(f, "probe_failed"),
            Self::DegenerateInput => write!(f, "degenerate_input"),
        }
    }
}

/// The combined per-turn drift verdict.
#[derive(Debug, Clone, Serialize)]
pub struct DriftRecord {
    /// Phase the reply was evaluated against.
    pub phase: Phase,
    /// Whether the turn drifted (score OR probe OR degenerate).
    pub drift: bool,
    /// The weighted feature score.
    pub score: f64,
    /// The contributing signals, empty when non-drifting.
    pub reasons: Vec<DriftReason>,
    /// The extracted features, kept for logging and evaluation.
    pub features: FeatureVector,
}

/// Weighted score over the intersection of feature and weight keys.
///
/// Keys present on only one side contribute 0 and are reported once per
/// call at `warn` level.
pub fn weighted_score(features: &FeatureVector, policy: &DriftPolicy) -> f64 {
    let map = features.as_map();

    let unweighted: Vec<&str> = map
        .keys()
        .filter(|name| !policy.weights.contains_key(**name))
        .copied()
        .collect();
    let unmatched: Vec<&str> = policy
        .weights
        .keys()
        .filter(|name| !map.contains_key(name.as_str()))
        .map(|s| s.as_str())
        .collect();
    if !unweighted.is_empty() {
        warn!(features = ?unweighted, "features without a configured weight");
    }
    if !unmatched.is_empty() {
        warn!(weights = ?unmatched, "configured weights without a matching feature");
    }

    map.iter()
        .filter_map(|(name, value)| policy.weights.get(*name).map(|w| value * w))
        .sum()
}

/// Score-only verdict: threshold comparison, soft tolerance, degenerate
/// override.
///
/// `previous_phase` is the phase of the most recent drift-window entry; when
/// it admits a forward transition into `phase` and the score lands in the
/// epsilon band just above the threshold, the verdict is softened to
/// non-drift.
pub fn score_verdict(
    features: &FeatureVector,
    phase: Phase,
    previous_phase: Option<Phase>,
    policy: &DriftPolicy,
) -> (f64, bool) {
    let score = weighted_score(features, policy);

    if features.degenerate {
        return (score, true);
    }

    let in_soft_band =
        score > policy.threshold && score < policy.threshold + policy.epsilon;
    let softened = policy.soft_tolerance
        && in_soft_band
        && previous_phase.is_some_and(|prev| admits_transition(prev, phase));

    (score, score > policy.threshold && !softened)
}

/// Full per-turn drift analysis: features → score verdict → probe → record.
pub fn analyze(
    phase: Phase,
    reply: &str,
    previous_reply: Option<&str>,
    previous_phase: Option<Phase>,
    policy: &DriftPolicy,
) -> DriftRecord {
    let features = features::extract(reply, previous_reply);
    let (score, score_drift) = score_verdict(&features, phase, previous_phase, policy);
    let probe_drift = probe::evaluate(phase, reply).is_drift();

    let mut reasons = Vec::new();
    if features.degenerate {
        reasons.push(DriftReason::DegenerateInput);
    }
    if score_drift && !features.degenerate {
        reasons.push(DriftReason::ScoreThreshold);
    }
    if probe_drift {
        reasons.push(DriftReason::ProbeFailed);
    }

    let drift = score_drift || probe_drift;
    debug!(
        phase = %phase,
        score = %format!("{score:.3}"),
        drift,
        ?reasons,
        "drift analysis"
    );

    DriftRecord {
        phase,
        drift,
        score,
        reasons,
        features,
    }
}
