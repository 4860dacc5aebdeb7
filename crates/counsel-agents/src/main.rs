//! Interactive counseling session runner.
//!
//! Wires configuration, probes the inference endpoints, and drives one
//! session over stdin/stdout. The transport layer proper is external; this
//! binary is the reference harness for the exchange contract: the outbound
//! payload of each turn is carried back in as the next inbound state.

use anyhow::{Context, Result};
use clap::Parser;
use counseling::{DriftPolicy, ExchangeRequest, ExchangeResponse, Phase, StageConductor};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use uuid::Uuid;

use counsel_agents::{check_endpoint, CounselConfig, RigGenerator, SessionService};

#[derive(Parser, Debug)]
#[command(name = "counsel-agents", about = "Multi-phase counseling session runner")]
struct Args {
    /// Path to a drift policy TOML (defaults to the built-in policy).
    #[arg(long)]
    policy: Option<std::path::PathBuf>,

    /// Session identifier (a fresh UUID when omitted).
    #[arg(long)]
    session: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let policy = match &args.policy {
        Some(path) => DriftPolicy::load(path)
            .with_context(|| format!("failed to load drift policy from {}", path.display()))?,
        None => DriftPolicy::default(),
    };

    let config = CounselConfig::default();
    for phase in Phase::ACTIVE {
        let endpoint = config.endpoint(phase);
        if !check_endpoint(&endpoint.url).await {
            warn!(phase = %phase, url = %endpoint.url, "endpoint not reachable");
        }
    }

    let generator = RigGenerator::new(config).context("failed to build rig clients")?;
    let service = SessionService::new(StageConductor::new(policy), generator);

    let session_id = args.session.unwrap_or_else(|| Uuid::new_v4().to_string());
    info!(session = %session_id, "counseling service ready");

    // Opening turn: the empathy intro.
    let mut state = service
        .exchange(next_request(&session_id, "", None))
        .await;
    println!("{}", state.response);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let question = line.trim().to_string();
        let mut response = service
            .exchange(next_request(&session_id, &question, Some(&state)))
            .await;
        println!("{}", response.response);

        // A phase change (or rollback) surfaces its intro on the next turn.
        while !response.intro_shown && !response.next_phase.is_terminal() {
            response = service
                .exchange(next_request(&session_id, "", Some(&response)))
                .await;
            println!("{}", response.response);
        }

        if response.next_phase.is_terminal() {
            info!(session = %session_id, "session complete");
            return Ok(());
        }
        state = response;
    }

    Ok(())
}

fn next_request(
    session_id: &str,
    question: &str,
    state: Option<&ExchangeResponse>,
) -> ExchangeRequest {
    match state {
        Some(prev) => ExchangeRequest {
            session_id: session_id.to_string(),
            phase: prev.next_phase,
            question: question.to_string(),
            history: prev.history.clone(),
            turn_in_phase: prev.turn_in_phase,
            drift_window: prev.drift_window.clone(),
            intro_shown: prev.intro_shown,
            pending_reply: None,
            retry_count: 0,
        },
        None => ExchangeRequest {
            session_id: session_id.to_string(),
            phase: Phase::Empathy,
            question: question.to_string(),
            history: Vec::new(),
            turn_in_phase: 0,
            drift_window: Default::default(),
            intro_shown: false,
            pending_reply: None,
            retry_count: 0,
        },
    }
}
