//! Fundamental types shared across the detection pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kill-chain stage of an attack's progression, ordered from benign probing
/// to data exfiltration. The ordering is used for dominant-stage tie-breaks
/// (higher index wins) and for within-session stage escalation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KillChainStage {
    #[default]
    Clean = 0,
    InitialAccess = 1,
    PrivilegeEscalation = 2,
    Persistence = 3,
    LateralMovement = 4,
    Exfiltration = 5,
}

impl KillChainStage {
    /// Numeric index of the stage (0-5).
    pub fn index(&self) -> u8 {
        *self as u8
    }

    /// Canonical display name, matching the dashboard vocabulary.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Clean => "CLEAN",
            Self::InitialAccess => "INITIAL_ACCESS",
            Self::PrivilegeEscalation => "PRIVILEGE_ESCALATION",
            Self::Persistence => "PERSISTENCE",
            Self::LateralMovement => "LATERAL_MOVEMENT",
            Self::Exfiltration => "EXFILTRATION",
        }
    }
}

impl std::fmt::Display for KillChainStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Routing decision applied to a message. Total order of severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    #[default]
    Allow,
    Harden,
    Block,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Allow => "ALLOW",
            Self::Harden => "HARDEN",
            Self::Block => "BLOCK",
        };
        f.write_str(s)
    }
}

/// The externally visible classification output for one message.
/// Immutable once produced. Output-only: serialized for the event
/// interface, never read back (rule ids borrow from the static table).
#[derive(Debug, Clone, Serialize)]
pub struct ThreatResult {
    /// Session this classification belongs to.
    pub session_id: String,
    /// Score after creative-mode mitigation, 0.0 - ceiling.
    pub mitigated_score: f64,
    /// Dominant kill-chain stage for the session after this message.
    pub stage: KillChainStage,
    /// Routing decision.
    pub verdict: Verdict,
    /// Ids of the rules that fired on this message.
    pub matched_rule_ids: Vec<&'static str>,
    /// Whether creative-mode dampening was applied to the score.
    pub creative_mode_applied: bool,
    /// Turn number within the session (1-based).
    pub turn_count: u64,
    /// Human-readable explanation for the dashboard. Never echoed to the
    /// client; internals are only exposed via the event interface.
    pub block_reason: Option<String>,
}

/// A prompt wrapped with protective structure. Derived per request, not
/// persisted beyond the request lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardenedPrompt {
    /// The user content, untouched.
    pub original_text: String,
    /// The wrapped prompt sent upstream. Always contains `original_text`
    /// verbatim; the transform never deletes or truncates user content.
    pub wrapped_text: String,
    /// How many times the safety rules were re-stated (1-3).
    pub reinforcement_count: u8,
}

/// Comparison record for a raw-vs-hardened dual dispatch, handed to the
/// event sink for dashboard observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualCallRecord {
    pub id: Uuid,
    pub session_id: String,
    /// Raw-path response, `None` when that branch timed out or failed.
    pub raw_response: Option<String>,
    /// Hardened-path response, `None` when no hardening was applied or the
    /// branch was unavailable.
    pub hardened_response: Option<String>,
    /// The response actually returned to the client.
    pub chosen_response: String,
    pub raw_latency_ms: Option<u64>,
    pub hardened_latency_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ordering() {
        assert!(KillChainStage::Clean < KillChainStage::InitialAccess);
        assert!(KillChainStage::PrivilegeEscalation < KillChainStage::Persistence);
        assert!(KillChainStage::LateralMovement < KillChainStage::Exfiltration);
        assert_eq!(KillChainStage::Exfiltration.index(), 5);
    }

    #[test]
    fn test_verdict_ordering() {
        assert!(Verdict::Allow < Verdict::Harden);
        assert!(Verdict::Harden < Verdict::Block);
    }

    #[test]
    fn test_stage_serde_names() {
        let json = serde_json::to_string(&KillChainStage::PrivilegeEscalation).unwrap();
        assert_eq!(json, "\"PRIVILEGE_ESCALATION\"");
        let back: KillChainStage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, KillChainStage::PrivilegeEscalation);
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::Block.to_string(), "BLOCK");
        assert_eq!(Verdict::Allow.to_string(), "ALLOW");
    }

    #[test]
    fn test_threat_result_serializes_for_event_interface() {
        let result = ThreatResult {
            session_id: "s1".into(),
            mitigated_score: 0.38,
            stage: KillChainStage::PrivilegeEscalation,
            verdict: Verdict::Harden,
            matched_rule_ids: vec!["IGNORE_INSTRUCTIONS", "PROMPT_EXTRACTION"],
            creative_mode_applied: true,
            turn_count: 3,
            block_reason: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("IGNORE_INSTRUCTIONS"));
        assert!(json.contains("PRIVILEGE_ESCALATION"));
        assert!(json.contains("HARDEN"));
    }
}
