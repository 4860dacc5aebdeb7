//! Session service — serializes exchanges per session and drives the
//! conductor around the generation collaborator.
//!
//! Session state travels with the transport payload; the service's job is
//! per-session mutual exclusion, payload validation, and mapping generator
//! errors onto the conductor's recovery kinds. A generation cancelled
//! mid-flight never reaches `complete_exchange`, so the session is left
//! unmutated.

use std::collections::HashMap;
use std::sync::Arc;

use counseling::{
    ConductError, ExchangeRequest, ExchangeResponse, GenerationOutcome, Preflight, SessionRecord,
    StageConductor,
};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::generator::ReplyGenerator;

/// Notice returned alongside a fresh session when the inbound payload was
/// unusable.
const RETRY_NOTICE: &str = "세션 정보를 확인할 수 없어 처음부터 다시 시작할게요. 다시 말씀해 주시겠어요?";

/// Notice returned for exchanges against a completed session.
const COMPLETE_NOTICE: &str = "지금까지 함께해 주셔서 감사합니다. 상담은 이미 마무리되었습니다.";

/// Drives complete exchanges for any number of independent sessions.
pub struct SessionService<G> {
    conductor: StageConductor,
    generator: G,
    /// Per-session guards; exchanges against one session are serialized.
    guards: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<G: ReplyGenerator> SessionService<G> {
    pub fn new(conductor: StageConductor, generator: G) -> Self {
        Self {
            conductor,
            generator,
            guards: Mutex::new(HashMap::new()),
        }
    }

    pub fn conductor(&self) -> &StageConductor {
        &self.conductor
    }

    async fn guard_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut guards = self.guards.lock().await;
        guards
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run one exchange from a raw JSON payload.
    ///
    /// A payload that cannot even be deserialized is answered with a fresh
    /// empathy session and a retry notice — the conductor never crashes on
    /// malformed input.
    pub async fn exchange_json(&self, payload: serde_json::Value) -> ExchangeResponse {
        match serde_json::from_value::<ExchangeRequest>(payload) {
            Ok(request) => self.exchange(request).await,
            Err(e) => {
                warn!(error = %e, "undecodable exchange payload, issuing fresh session");
                self.fresh_session_response(None)
            }
        }
    }

    /// Run one complete exchange.
    pub async fn exchange(&self, mut request: ExchangeRequest) -> ExchangeResponse {
        if request.session_id.trim().is_empty() {
            request.session_id = Uuid::new_v4().to_string();
        }
        let session_id = request.session_id.clone();
        let question = request.question.clone();

        let guard = self.guard_for(&session_id).await;
        let _serialized = guard.lock().await;

        let mut record = match request.into_record(self.conductor.policy()) {
            Ok(record) => record,
            Err(ConductError::MalformedSession { reason }) => {
                warn!(session = %session_id, %reason, "malformed session payload");
                return self.fresh_session_response(Some(session_id));
            }
            Err(ConductError::TerminalSession { .. }) => {
                return self.fresh_session_response(Some(session_id));
            }
        };

        match self.conductor.preflight(&record, &question) {
            Preflight::SessionComplete => {
                info!(session = %session_id, "exchange against completed session");
                ExchangeResponse::from_record(&record, COMPLETE_NOTICE.to_string(), false)
            }
            Preflight::EmitIntro => {
                let outcome = self.conductor.emit_intro(&mut record);
                ExchangeResponse::from_record(&record, outcome.response, false)
            }
            Preflight::EmitFallback => {
                let outcome = self.conductor.emit_fallback(&mut record);
                ExchangeResponse::from_record(&record, outcome.response, false)
            }
            Preflight::Generate(ctx) => {
                let outcome = match self.generator.generate(&ctx, &question).await {
                    Ok(reply) => GenerationOutcome::Completed(reply),
                    Err(e) => {
                        warn!(session = %session_id, error = %e, "generation failed");
                        GenerationOutcome::Failed(e.failure_kind())
                    }
                };
                match self.conductor.complete_exchange(&mut record, &question, outcome) {
                    Ok(exchange) => ExchangeResponse::from_record(
                        &record,
                        exchange.response,
                        exchange.reset_triggered,
                    ),
                    // Preflight already screened terminal sessions; a race
                    // here still answers cleanly.
                    Err(_) => {
                        ExchangeResponse::from_record(&record, COMPLETE_NOTICE.to_string(), false)
                    }
                }
            }
        }
    }

    fn fresh_session_response(&self, session_id: Option<String>) -> ExchangeResponse {
        let id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let record = SessionRecord::new(id);
        ExchangeResponse::from_record(&record, RETRY_NOTICE.to_string(), false)
    }
}
