//! Single-message scanner.
//!
//! Applies the rule set to one message and produces raw rule matches. Pure:
//! no session state is read or written, and cost is bounded by message
//! length times rule count, independent of session history.
//!
//! Input is normalized before matching so that simple obfuscation (extra
//! whitespace, Unicode homoglyphs, zero-width characters) does not slip
//! past keyword patterns.

use crate::rules::RuleSet;
use crate::types::KillChainStage;
use serde::Serialize;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;

/// A single rule that fired on a message. Carries enough of the rule for
/// downstream components (mitigator, router) to work without re-consulting
/// the rule table.
#[derive(Debug, Clone, Serialize)]
pub struct RuleMatch {
    pub rule_id: &'static str,
    pub stage: KillChainStage,
    pub weight: f64,
    pub dampenable: bool,
    pub description: &'static str,
}

/// Result of scanning one message. Produced fresh per message, never
/// persisted.
/// Output-only: serialized for the event interface, never read back.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub matches: Vec<RuleMatch>,
    /// Sum of matched rule weights.
    pub raw_score: f64,
    /// Highest kill-chain stage among matches; ties broken by highest
    /// weight, then declaration order. `Clean` when nothing matched.
    pub dominant_stage: KillChainStage,
}

impl ScanResult {
    fn clean() -> Self {
        Self {
            matches: Vec::new(),
            raw_score: 0.0,
            dominant_stage: KillChainStage::Clean,
        }
    }

    /// Whether any non-dampenable (hard-override) rule fired.
    pub fn has_hard_override(&self) -> bool {
        self.matches.iter().any(|m| !m.dampenable)
    }

    /// Sum of weights of dampenable matches.
    pub fn dampenable_score(&self) -> f64 {
        self.matches
            .iter()
            .filter(|m| m.dampenable)
            .map(|m| m.weight)
            .sum()
    }

    /// Sum of weights of non-dampenable matches.
    pub fn hard_score(&self) -> f64 {
        self.matches
            .iter()
            .filter(|m| !m.dampenable)
            .map(|m| m.weight)
            .sum()
    }

    pub fn matched_rule_ids(&self) -> Vec<&'static str> {
        self.matches.iter().map(|m| m.rule_id).collect()
    }
}

/// Applies the rule set to a single message.
#[derive(Clone)]
pub struct MessageScanner {
    rules: Arc<RuleSet>,
}

impl MessageScanner {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self { rules }
    }

    /// Scan a message. Empty or whitespace-only input is treated as clean
    /// with zero score (fail open on parsing, never on a detected pattern).
    pub fn scan(&self, message: &str) -> ScanResult {
        let normalized = normalize_text(message);
        if normalized.is_empty() {
            return ScanResult::clean();
        }

        let mut matches = Vec::new();
        let mut raw_score = 0.0;
        let mut dominant: Option<(KillChainStage, f64)> = None;

        for rule in self.rules.iter() {
            if !rule.matcher.matches(&normalized) {
                continue;
            }
            raw_score += rule.weight;
            // Strictly-greater comparison keeps the first-declared rule on
            // full ties.
            let candidate = (rule.stage, rule.weight);
            if dominant.map_or(true, |best| candidate > best) {
                dominant = Some(candidate);
            }
            matches.push(RuleMatch {
                rule_id: rule.id,
                stage: rule.stage,
                weight: rule.weight,
                dampenable: rule.dampenable,
                description: rule.description,
            });
        }

        ScanResult {
            raw_score,
            dominant_stage: dominant.map(|(stage, _)| stage).unwrap_or_default(),
            matches,
        }
    }
}

/// Normalize text for matching: NFKD decomposition, combining-mark strip,
/// homoglyph folding to ASCII, zero-width character removal, whitespace
/// collapse, and lowercasing.
pub fn normalize_text(text: &str) -> String {
    let nfkd: String = text.nfkd().collect();
    let mut result = String::with_capacity(nfkd.len());
    let mut prev_space = false;
    for c in nfkd.chars() {
        if unicode_normalization::char::is_combining_mark(c) || is_zero_width_char(c) {
            continue;
        }
        let c = homoglyph_to_ascii(c).unwrap_or(c);
        if c.is_whitespace() {
            if !prev_space && !result.is_empty() {
                result.push(' ');
                prev_space = true;
            }
        } else {
            result.extend(c.to_lowercase());
            prev_space = false;
        }
    }
    result.trim_end().to_string()
}

/// Map a known Unicode confusable to its ASCII equivalent. Returns `None`
/// for ordinary characters.
fn homoglyph_to_ascii(c: char) -> Option<char> {
    match c {
        // Cyrillic lowercase
        '\u{0430}' => Some('a'),
        '\u{0441}' => Some('c'),
        '\u{0435}' => Some('e'),
        '\u{043E}' => Some('o'),
        '\u{0440}' => Some('p'),
        '\u{0443}' => Some('y'),
        '\u{0445}' => Some('x'),
        '\u{0456}' => Some('i'),
        '\u{0455}' => Some('s'),
        // Greek lowercase
        '\u{03B1}' => Some('a'),
        '\u{03B5}' => Some('e'),
        '\u{03BF}' => Some('o'),
        '\u{03C1}' => Some('p'),
        // Fullwidth ASCII variants (U+FF01 - U+FF5E map to U+0021 - U+007E)
        '\u{FF01}'..='\u{FF5E}' => {
            let ascii = (c as u32 - 0xFF01 + 0x0021) as u8 as char;
            Some(ascii)
        }
        _ => None,
    }
}

/// Zero-width and invisible formatting characters used to hide content.
fn is_zero_width_char(c: char) -> bool {
    matches!(
        c,
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' | '\u{2060}'
            | '\u{200E}' | '\u{200F}' | '\u{202A}' | '\u{202B}' | '\u{202C}'
            | '\u{202D}' | '\u{202E}' | '\u{2066}' | '\u{2067}' | '\u{2068}'
            | '\u{2069}'
    )
}
