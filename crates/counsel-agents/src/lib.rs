//! Generation collaborators and session service for the counseling
//! dialogue loop.
//!
//! The deterministic core lives in the `counseling` crate; this crate adds
//! the LLM-facing half:
//! - Per-phase rig agents built from OpenAI-compatible endpoints
//! - The [`generator::ReplyGenerator`] boundary with a closed error taxonomy
//! - [`service::SessionService`], which serializes exchanges per session
//!   and recovers every failure into a well-formed outbound payload

pub mod config;
pub mod generator;
pub mod prompts;
pub mod service;

pub use config::{check_endpoint, ClientSet, CounselConfig, Endpoint};
pub use generator::{GenerationError, ReplyGenerator, RetryCategory, RigGenerator};
pub use service::SessionService;
