//! The generation collaborator boundary.
//!
//! The conductor consumes only fully assembled replies; streaming,
//! retries, and latency bounds all live on this side of the trait. Errors
//! are a closed taxonomy the service maps onto the conductor's failure
//! kinds — no catch-all exception channel.

use std::time::Duration;

use async_trait::async_trait;
use counseling::{FailureKind, GenerationContext, Phase};
use rig::client::CompletionClient;
use rig::completion::{Chat, Message};
use thiserror::Error;
use tracing::debug;

use crate::config::{ClientSet, CounselConfig};
use crate::prompts;

/// Classification used to decide whether a failed generation may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Transient backend error — safe to retry immediately.
    Transient,
    /// Rate limit — retry with back-off.
    RateLimit,
    /// Terminal for this exchange; the conductor substitutes recovery text.
    Terminal,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Transient | Self::RateLimit)
    }
}

/// Errors from the generation collaborator.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The inference backend failed (network, backend crash, bad response).
    #[error("generation backend failure: {0}")]
    Backend(String),

    /// The request exceeded the collaborator's latency bound.
    #[error("generation timed out after {0}s")]
    Timeout(u64),

    /// The backend rejected the request for rate limiting.
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// The backend produced only whitespace.
    #[error("generation produced an empty reply")]
    Empty,
}

impl GenerationError {
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::Backend(_) => RetryCategory::Transient,
            Self::RateLimit(_) => RetryCategory::RateLimit,
            Self::Timeout(_) | Self::Empty => RetryCategory::Terminal,
        }
    }

    /// The conductor-side failure kind this error recovers as.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Backend(_) | Self::RateLimit(_) => FailureKind::Backend,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Empty => FailureKind::EmptyReply,
        }
    }
}

/// A collaborator that turns a generation context into a finished reply.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(
        &self,
        ctx: &GenerationContext,
        question: &str,
    ) -> Result<String, GenerationError>;
}

/// Rig-backed generator: one agent per request, built from the phase's
/// endpoint and system instruction, fed the trailing exchange window.
pub struct RigGenerator {
    config: CounselConfig,
    clients: ClientSet,
}

impl RigGenerator {
    pub fn new(config: CounselConfig) -> anyhow::Result<Self> {
        let clients = ClientSet::from_config(&config)?;
        Ok(Self { config, clients })
    }

    fn history(ctx: &GenerationContext) -> Vec<Message> {
        let mut messages = Vec::with_capacity(ctx.context_pairs.len() * 2);
        for pair in &ctx.context_pairs {
            messages.push(Message::user(pair.user.clone()));
            messages.push(Message::assistant(pair.assistant.clone()));
        }
        messages
    }
}

#[async_trait]
impl ReplyGenerator for RigGenerator {
    async fn generate(
        &self,
        ctx: &GenerationContext,
        question: &str,
    ) -> Result<String, GenerationError> {
        debug_assert!(ctx.phase != Phase::Terminal);
        let endpoint = self.config.endpoint(ctx.phase);
        let client = self
            .clients
            .for_endpoint(endpoint)
            .ok_or_else(|| GenerationError::Backend(format!("no client for {}", endpoint.url)))?;

        let preamble = prompts::instruction(ctx);
        let agent = client
            .agent(&endpoint.model)
            .preamble(&preamble)
            .temperature(self.config.temperature)
            .build();

        debug!(
            phase = %ctx.phase,
            turn = ctx.turn_in_phase,
            model = %endpoint.model,
            pairs = ctx.context_pairs.len(),
            "generating reply"
        );

        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        let response = tokio::time::timeout(timeout, agent.chat(question, Self::history(ctx)))
            .await
            .map_err(|_| GenerationError::Timeout(self.config.request_timeout_secs))?
            .map_err(|e| {
                let text = e.to_string();
                if text.to_lowercase().contains("rate") {
                    GenerationError::RateLimit(text)
                } else {
                    GenerationError::Backend(text)
                }
            })?;

        let reply = response.trim().to_string();
        if reply.is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(reply)
    }
}
