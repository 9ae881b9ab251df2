//! Creative-mode false-positive mitigation.
//!
//! Legitimate fiction and role-play trips the same keyword rules as real
//! jailbreak attempts ("write a story where a character says..."). When the
//! current message carries explicit narrative framing, the contribution of
//! dampenable rules is reduced by a configurable factor. Rules flagged
//! non-dampenable (shell injection, exfiltration) are never reduced, so
//! "it's just a story" framing cannot bypass high-severity detections.

use crate::config::MitigationConfig;
use crate::scanner::{normalize_text, ScanResult};
use crate::session::SessionSnapshot;
use regex::Regex;

/// Narrative/fiction framing cues. Matched against the normalized current
/// message, not the whole session.
const CREATIVE_SIGNALS: &[&str] = &[
    r"\b(write\s+a\s+story|fiction|fictional|novel|narrative|roleplay|let'?s\s+play|tabletop|d&d|dnd|game\s+master)\b",
    r"\b(as\s+a\s+character|in\s+character|my\s+character|your\s+character|protagonist|antagonist)\b",
    r"\b(fantasy|sci-?fi|science\s+fiction|horror\s+story|thriller\s+plot|screenplay|fanfic)\b",
];

/// Adjusts the scorer's output downward under fiction/role-play framing.
pub struct CreativeModeMitigator {
    patterns: Vec<Regex>,
    factor: f64,
    ceiling: f64,
}

impl CreativeModeMitigator {
    pub fn new(config: MitigationConfig, ceiling: f64) -> Self {
        let patterns = CREATIVE_SIGNALS
            .iter()
            .map(|p| Regex::new(p).expect("built-in creative signal pattern is valid"))
            .collect();
        Self {
            patterns,
            factor: config.dampening_factor,
            ceiling,
        }
    }

    /// Whether the message carries explicit creative framing.
    pub fn is_creative(&self, message: &str) -> bool {
        let normalized = normalize_text(message);
        self.patterns.iter().any(|p| p.is_match(&normalized))
    }

    /// Compute the mitigated score for this turn. Returns the score and
    /// whether dampening was actually applied.
    ///
    /// Dampening applies only when creative cues are present *and* at least
    /// one dampenable rule matched; the carried (decay + drift) component
    /// and non-dampenable weights pass through untouched.
    pub fn mitigate(
        &self,
        snapshot: &SessionSnapshot,
        scan: &ScanResult,
        message: &str,
    ) -> (f64, bool) {
        let dampenable = scan.dampenable_score();
        if dampenable <= 0.0 || !self.is_creative(message) {
            return (snapshot.score, false);
        }

        let mitigated = (snapshot.carried_score + scan.hard_score() + self.factor * dampenable)
            .clamp(0.0, self.ceiling);
        (mitigated, true)
    }
}
