//! Counseling Dialogue Core
//!
//! This library provides the deterministic half of a multi-phase counseling
//! dialogue system:
//! - Feature extraction over generated replies (lexical repetition, register
//!   shift, tense, question density, similarity to the previous reply)
//! - Per-phase plausibility probes as a rule-based drift signal
//! - A weighted drift scorer with soft tolerance around phase changes
//! - A capped window of recent drift outcomes deciding rollback
//! - The stage conductor: a turn-budgeted state machine over the session
//!
//! No module here performs LLM calls or I/O beyond logging. The generation
//! collaborator and transport glue live in the `counsel-agents` crate; this
//! crate only consumes fully assembled replies and produces the next
//! session state.
//!
//! # Determinism
//!
//! For identical inputs every function in this crate returns identical
//! results. Extraction, scoring, and probing are pure; the conductor
//! mutates a session only inside a single atomic step per exchange.

pub mod conductor;
pub mod config;
pub mod error;
pub mod features;
pub mod phase;
pub mod probe;
pub mod repair;
pub mod scorer;
pub mod session;
pub mod tracker;

// Re-export the conductor surface
pub use conductor::{
    ExchangeOutcome, FailureKind, GenerationContext, GenerationOutcome, Preflight, StageConductor,
};

// Re-export configuration types
pub use config::{DriftPolicy, PolicyError, TurnBudgets};

// Re-export the error taxonomy
pub use error::ConductError;

// Re-export feature extraction types
pub use features::{extract, FeatureVector, FEATURE_NAMES};

// Re-export phase types
pub use phase::{admits_transition, is_legal_transition, Phase, PhaseRule};

// Re-export probe types
pub use probe::ProbeOutcome;

// Re-export scoring types
pub use scorer::{analyze, DriftReason, DriftRecord};

// Re-export session types
pub use session::{ExchangePair, ExchangeRequest, ExchangeResponse, SessionRecord, Speaker, Utterance};

// Re-export drift window types
pub use tracker::{DriftWindow, WindowEntry};
