//! Endpoint and model configuration for the five phase counselors.
//!
//! Each phase maps to a fine-tuned model behind an OpenAI-compatible
//! endpoint. Phases typically share one inference server, so clients are
//! deduplicated by base URL — model selection happens via the model name in
//! the request.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (e.g. `COUNSEL_MI_MODEL`)
//! 2. Values in this struct
//! 3. Built-in defaults (one local endpoint, per-phase merged models)

use std::collections::HashMap;
use std::env;

use anyhow::{Context, Result};
use counseling::Phase;
use rig::providers::openai;
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "http://localhost:8080/v1";

fn default_model(phase: Phase) -> &'static str {
    match phase {
        Phase::Empathy => "merged-empathy-8.0B-chat-Q4_K_M",
        Phase::Mi => "merged-mi-chat-q4_k_m",
        Phase::Cbt1 => "merged-first-8.0B-chat-Q4_K_M",
        Phase::Cbt2 => "merged-mid-8.0B-chat-Q4_K_M",
        Phase::Cbt3 => "merged-cbt3-8.0B-chat-Q4_K_M",
        Phase::Terminal => "merged-mi-chat-q4_k_m",
    }
}

fn env_key(phase: Phase, suffix: &str) -> String {
    format!("COUNSEL_{}_{}", phase.to_string().to_uppercase(), suffix)
}

/// One phase counselor endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    pub url: String,
    pub model: String,
}

/// Top-level configuration for the counseling service.
#[derive(Debug, Clone)]
pub struct CounselConfig {
    /// Per-phase endpoints (empathy, mi, cbt1, cbt2, cbt3).
    pub endpoints: HashMap<Phase, Endpoint>,
    /// Sampling temperature for generated replies.
    pub temperature: f64,
    /// Upper latency bound per generation request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for CounselConfig {
    fn default() -> Self {
        let mut endpoints = HashMap::new();
        for phase in Phase::ACTIVE {
            let url = env::var(env_key(phase, "URL"))
                .or_else(|_| env::var("COUNSEL_BASE_URL"))
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
            let model = env::var(env_key(phase, "MODEL"))
                .unwrap_or_else(|_| default_model(phase).to_string());
            endpoints.insert(phase, Endpoint { url, model });
        }
        Self {
            endpoints,
            temperature: 0.5,
            request_timeout_secs: 120,
        }
    }
}

impl CounselConfig {
    /// The endpoint serving a phase. Terminal maps to the Mi endpoint but
    /// is never generated against.
    pub fn endpoint(&self, phase: Phase) -> &Endpoint {
        self.endpoints
            .get(&phase)
            .unwrap_or_else(|| &self.endpoints[&Phase::Mi])
    }
}

/// Pre-built rig clients, deduplicated by endpoint URL.
pub struct ClientSet {
    clients: HashMap<String, openai::CompletionsClient>,
}

impl ClientSet {
    pub fn from_config(config: &CounselConfig) -> Result<Self> {
        let mut clients = HashMap::new();
        for endpoint in config.endpoints.values() {
            if clients.contains_key(&endpoint.url) {
                continue;
            }
            let client = openai::CompletionsClient::builder()
                .api_key("not-needed")
                .base_url(&endpoint.url)
                .build()
                .with_context(|| format!("failed to build client for {}", endpoint.url))?;
            clients.insert(endpoint.url.clone(), client);
        }
        Ok(Self { clients })
    }

    /// The client serving an endpoint URL.
    pub fn for_endpoint(&self, endpoint: &Endpoint) -> Option<&openai::CompletionsClient> {
        self.clients.get(&endpoint.url)
    }
}

/// Check if an inference endpoint is reachable (GET /models).
pub async fn check_endpoint(url: &str) -> bool {
    let models_url = format!("{url}/models");
    match reqwest::Client::new()
        .get(&models_url)
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_covers_active_phases() {
        let config = CounselConfig::default();
        for phase in Phase::ACTIVE {
            let endpoint = config.endpoint(phase);
            assert!(!endpoint.model.is_empty());
            assert!(endpoint.url.starts_with("http"));
        }
    }

    #[test]
    fn test_terminal_falls_back_to_mi_endpoint() {
        let config = CounselConfig::default();
        assert_eq!(
            config.endpoint(Phase::Terminal).model,
            config.endpoint(Phase::Mi).model
        );
    }

    #[test]
    fn test_clients_deduplicated_by_url() {
        let config = CounselConfig::default();
        let clients = ClientSet::from_config(&config).unwrap();
        // All defaults share one base URL, so exactly one client exists.
        assert_eq!(clients.clients.len(), 1);
    }
}
