//! Dual-call orchestration and the top-level `Guardian` facade.
//!
//! Routes each classified message to the upstream model: ALLOW passes the
//! original prompt through, HARDEN dispatches the raw and hardened prompts
//! concurrently (the client only ever sees the hardened branch; the raw
//! branch exists for effectiveness comparison), BLOCK short-circuits with a
//! canned refusal and no upstream call at all.

use crate::config::GuardianConfig;
use crate::engine::ThreatEngine;
use crate::error::{Result, UpstreamError};
use crate::events::{EventSink, GuardianEvent};
use crate::hardener::PromptHardener;
use crate::types::{DualCallRecord, ThreatResult, Verdict};
use crate::upstream::UpstreamProvider;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// Returned to the client when a message is refused. Deliberately generic:
/// it reveals nothing about which rule fired.
pub const SAFE_REFUSAL: &str =
    "I can't help with that request. If you believe this was a mistake, please rephrase and try again.";

/// The client-facing reply for one handled message.
#[derive(Debug, Clone)]
pub struct GuardianReply {
    pub threat: ThreatResult,
    /// Text returned to the client: the upstream response, or the canned
    /// refusal for blocked messages.
    pub response_text: String,
    /// Comparison record for dual-dispatched messages, `None` for ALLOW and
    /// BLOCK paths.
    pub record: Option<DualCallRecord>,
}

/// Orchestrates classification, hardening, and upstream dispatch.
pub struct Guardian {
    engine: ThreatEngine,
    hardener: PromptHardener,
    upstream: Arc<dyn UpstreamProvider>,
    events: Arc<dyn EventSink>,
    call_timeout: Duration,
}

impl Guardian {
    pub fn new(
        config: &GuardianConfig,
        upstream: Arc<dyn UpstreamProvider>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let engine = ThreatEngine::new(config, events.clone())?;
        Ok(Self {
            engine,
            hardener: PromptHardener::new(
                config.thresholds.harden,
                config.thresholds.block,
                config.hardening.max_reinforcements,
            ),
            upstream,
            events,
            call_timeout: Duration::from_secs(config.upstream.timeout_secs),
        })
    }

    pub fn engine(&self) -> &ThreatEngine {
        &self.engine
    }

    /// Handle one message end to end: classify, then dispatch per verdict.
    pub async fn handle(&self, session_id: &str, message: &str) -> Result<GuardianReply> {
        let threat = self.engine.analyze(session_id, message).await;

        match threat.verdict {
            Verdict::Block => {
                info!(
                    session_id,
                    score = threat.mitigated_score,
                    "message blocked, upstream not contacted"
                );
                self.events.emit(GuardianEvent::MessageBlocked {
                    session_id: session_id.to_string(),
                    reason: threat
                        .block_reason
                        .clone()
                        .unwrap_or_else(|| "blocked".to_string()),
                    timestamp: Utc::now(),
                });
                Ok(GuardianReply {
                    threat,
                    response_text: SAFE_REFUSAL.to_string(),
                    record: None,
                })
            }
            Verdict::Allow => {
                let response_text = self.call_with_timeout(message.to_string()).await??;
                Ok(GuardianReply {
                    threat,
                    response_text,
                    record: None,
                })
            }
            Verdict::Harden => self.dual_dispatch(session_id, message, threat).await,
        }
    }

    /// Dispatch the raw and hardened prompts concurrently. Each branch gets
    /// an independent timeout; a raw-branch failure degrades the comparison
    /// record, a hardened-branch failure fails the request (retryable).
    async fn dual_dispatch(
        &self,
        session_id: &str,
        message: &str,
        threat: ThreatResult,
    ) -> Result<GuardianReply> {
        let hardened = self
            .hardener
            .harden(message, threat.mitigated_score, threat.stage);

        let raw_task = self.spawn_call(message.to_string());
        let hardened_task = self.spawn_call(hardened.wrapped_text.clone());

        let (raw_outcome, hardened_outcome) = tokio::join!(raw_task, hardened_task);

        let (hardened_response, hardened_latency_ms) = match hardened_outcome {
            Ok((Ok(text), latency)) => (text, latency),
            Ok((Err(err), _)) => return Err(err.into()),
            Err(join_err) => {
                return Err(UpstreamError::ApiRequest {
                    message: format!("hardened dispatch task failed: {join_err}"),
                }
                .into());
            }
        };

        let (raw_response, raw_latency_ms) = match raw_outcome {
            Ok((Ok(text), latency)) => (Some(text), Some(latency)),
            Ok((Err(err), _)) => {
                // Comparison-only branch: absorb the failure.
                warn!(session_id, error = %err, "raw comparison branch failed");
                (None, None)
            }
            Err(join_err) => {
                warn!(session_id, error = %join_err, "raw comparison task panicked");
                (None, None)
            }
        };

        let record = DualCallRecord {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            raw_response,
            hardened_response: Some(hardened_response.clone()),
            chosen_response: hardened_response.clone(),
            raw_latency_ms,
            hardened_latency_ms: Some(hardened_latency_ms),
            timestamp: Utc::now(),
        };

        // Fire-and-forget: event emission must never delay the reply.
        let events = self.events.clone();
        let event_record = record.clone();
        tokio::spawn(async move {
            events.emit(GuardianEvent::DualCallCompleted {
                record: event_record,
            });
        });

        Ok(GuardianReply {
            threat,
            response_text: hardened_response,
            record: Some(record),
        })
    }

    /// Spawn an upstream call on its own task with its own deadline, so one
    /// slow branch cannot hold up the other.
    fn spawn_call(
        &self,
        prompt: String,
    ) -> tokio::task::JoinHandle<(std::result::Result<String, UpstreamError>, u64)> {
        let upstream = self.upstream.clone();
        let timeout = self.call_timeout;
        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = match tokio::time::timeout(timeout, upstream.complete(&prompt)).await {
                Ok(result) => result,
                Err(_) => Err(UpstreamError::Timeout {
                    timeout_secs: timeout.as_secs(),
                }),
            };
            (outcome, started.elapsed().as_millis() as u64)
        })
    }

    /// Single-branch call used for the ALLOW path.
    async fn call_with_timeout(
        &self,
        prompt: String,
    ) -> Result<std::result::Result<String, UpstreamError>> {
        match self.spawn_call(prompt).await {
            Ok((outcome, _)) => Ok(outcome),
            Err(join_err) => Err(UpstreamError::ApiRequest {
                message: format!("dispatch task failed: {join_err}"),
            }
            .into()),
        }
    }
}
