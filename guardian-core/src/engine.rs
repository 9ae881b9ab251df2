//! Threat engine: the classification pipeline.
//!
//! Assembles scanner, session scorer, creative-mode mitigator, and verdict
//! router into a single `analyze` entry point. The engine classifies; it
//! never talks to the upstream model (that's the orchestrator's job).

use crate::config::GuardianConfig;
use crate::drift::LexicalDriftDetector;
use crate::error::Result;
use crate::events::{EventSink, GuardianEvent};
use crate::mitigator::CreativeModeMitigator;
use crate::router::VerdictRouter;
use crate::rules::RuleSet;
use crate::scanner::{MessageScanner, ScanResult};
use crate::session::{SessionScorer, SessionStore};
use crate::types::{ThreatResult, Verdict};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// Classifies one message at a time against per-session threat state.
pub struct ThreatEngine {
    scanner: MessageScanner,
    scorer: SessionScorer,
    mitigator: CreativeModeMitigator,
    router: VerdictRouter,
    events: Arc<dyn EventSink>,
}

impl ThreatEngine {
    /// Build an engine with the built-in rule set.
    pub fn new(config: &GuardianConfig, events: Arc<dyn EventSink>) -> Result<Self> {
        let rules = Arc::new(RuleSet::builtin()?);
        Ok(Self::with_rules(config, rules, events))
    }

    /// Build an engine with a caller-supplied rule set.
    pub fn with_rules(
        config: &GuardianConfig,
        rules: Arc<RuleSet>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let store = Arc::new(SessionStore::new());
        let scorer = SessionScorer::new(
            store,
            Box::new(LexicalDriftDetector::new(config.drift.clone())),
            config.decay.clone(),
            config.session.clone(),
        );
        Self {
            scanner: MessageScanner::new(rules),
            scorer,
            mitigator: CreativeModeMitigator::new(
                config.mitigation.clone(),
                config.session.max_score,
            ),
            router: VerdictRouter::new(config.thresholds.harden, config.thresholds.block),
            events,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        self.scorer.store()
    }

    /// Classify one message within its session and return the verdict.
    ///
    /// Runs the full pipeline: scan, session update (decay + drift under
    /// the per-session lock), creative-mode mitigation, verdict routing.
    pub async fn analyze(&self, session_id: &str, message: &str) -> ThreatResult {
        let scan = self.scanner.scan(message);
        let snapshot = self.scorer.update(session_id, message, &scan).await;
        let (mitigated_score, creative_mode_applied) =
            self.mitigator.mitigate(&snapshot, &scan, message);
        let verdict = self.router.route(mitigated_score, &scan);

        let block_reason = if verdict == Verdict::Block {
            Some(Self::block_reason(&scan, mitigated_score))
        } else {
            None
        };

        let result = ThreatResult {
            session_id: session_id.to_string(),
            mitigated_score,
            stage: snapshot.stage,
            verdict,
            matched_rule_ids: scan.matched_rule_ids(),
            creative_mode_applied,
            turn_count: snapshot.turn_count,
            block_reason,
        };

        debug!(
            session_id,
            score = result.mitigated_score,
            stage = %result.stage,
            verdict = %result.verdict,
            rules = ?result.matched_rule_ids,
            "message classified"
        );

        self.events.emit(GuardianEvent::ThreatDetected {
            session_id: result.session_id.clone(),
            mitigated_score: result.mitigated_score,
            stage: result.stage,
            verdict: result.verdict,
            rule_ids: result.matched_rule_ids.iter().map(|s| s.to_string()).collect(),
            timestamp: Utc::now(),
        });

        result
    }

    /// Drop a session's accumulated state. The next message starts clean.
    pub fn reset_session(&self, session_id: &str) -> bool {
        let removed = self.scorer.store().reset(session_id);
        if removed {
            info!(session_id, "session state reset");
            self.events.emit(GuardianEvent::SessionReset {
                session_id: session_id.to_string(),
                timestamp: Utc::now(),
            });
        }
        removed
    }

    /// Dashboard explanation: the dominant signal plus a count of the rest.
    /// No cumulative-score-only block ever reaches this without at least the
    /// score itself to report.
    fn block_reason(scan: &ScanResult, mitigated_score: f64) -> String {
        match scan.matches.first() {
            Some(first) if scan.matches.len() > 1 => {
                let rest: Vec<&str> = scan.matches[1..].iter().map(|m| m.rule_id).collect();
                format!(
                    "{} (+{} additional signal(s): {})",
                    first.description,
                    rest.len(),
                    rest.join(", ")
                )
            }
            Some(first) => first.description.to_string(),
            None => format!(
                "Cumulative session threat score {:.2} exceeded the block threshold",
                mitigated_score
            ),
        }
    }
}
