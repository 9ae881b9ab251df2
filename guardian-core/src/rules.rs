//! Detection rule table.
//!
//! Each rule pairs a pattern matcher with a kill-chain stage, a weight, and
//! a dampenable flag. Rules flagged `dampenable = false` are hard-override
//! signals (shell injection, credential exfiltration) that force a BLOCK
//! verdict and are never reduced by creative-mode mitigation.
//!
//! The table is compiled once at process start into an immutable `RuleSet`
//! shared without locking.

use crate::error::ConfigError;
use crate::types::KillChainStage;
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;

/// Polymorphic pattern matcher so pattern syntax (literal, regex) is
/// pluggable without changing the scanner's contract.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Case-insensitive substring match against normalized text.
    Literal(String),
    /// Compiled regular expression, case-insensitive.
    Regex(Regex),
}

impl Matcher {
    /// Build a case-insensitive regex matcher.
    pub fn regex(id: &str, pattern: &str) -> Result<Self, ConfigError> {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::InvalidPattern {
                id: id.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self::Regex(re))
    }

    /// Build a literal matcher.
    pub fn literal(needle: impl Into<String>) -> Self {
        Self::Literal(needle.into())
    }

    /// Test the matcher against (already normalized) text.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Literal(needle) => text.contains(needle.as_str()),
            Self::Regex(re) => re.is_match(text),
        }
    }
}

/// A single detection rule. Immutable after load.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Unique, stable identifier surfaced in threat results.
    pub id: &'static str,
    /// The kill-chain stage this rule indicates. Exactly one per rule.
    pub stage: KillChainStage,
    pub matcher: Matcher,
    /// Score contribution when the rule fires (>= 0).
    pub weight: f64,
    /// Whether creative-mode mitigation may reduce this rule's weight.
    /// Hard-override rules set this to false.
    pub dampenable: bool,
    /// Dashboard-facing explanation of what firing this rule means.
    pub description: &'static str,
}

/// The loaded, validated rule table.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Build a rule set from explicit rules, validating uniqueness and
    /// non-emptiness. Both violations are fatal at startup.
    pub fn from_rules(rules: Vec<Rule>) -> Result<Self, ConfigError> {
        if rules.is_empty() {
            return Err(ConfigError::EmptyRuleSet);
        }
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id) {
                return Err(ConfigError::DuplicateRuleId {
                    id: rule.id.to_string(),
                });
            }
            if rule.weight < 0.0 {
                return Err(ConfigError::Invalid {
                    message: format!("rule '{}' has negative weight {}", rule.id, rule.weight),
                });
            }
        }
        Ok(Self { rules })
    }

    /// The built-in detection table: prompt-override, probing, persistence,
    /// lateral-movement, and exfiltration patterns.
    pub fn builtin() -> Result<Self, ConfigError> {
        let mut rules = Vec::new();

        // -- Privilege escalation ------------------------------------------
        rules.push(Rule {
            id: "IGNORE_INSTRUCTIONS",
            stage: KillChainStage::PrivilegeEscalation,
            matcher: Matcher::regex(
                "IGNORE_INSTRUCTIONS",
                r"\bignore\s+(all\s+)?(previous|prior|above|your)\s+(instructions?|rules?|guidelines?|prompt)\b",
            )?,
            weight: 0.45,
            dampenable: true,
            description: "Attempted to override system instructions using an 'ignore previous instructions' pattern",
        });
        rules.push(Rule {
            id: "PERSONA_OVERRIDE",
            stage: KillChainStage::PrivilegeEscalation,
            matcher: Matcher::regex(
                "PERSONA_OVERRIDE",
                r"\byou\s+are\s+now\s+(a\s+)?(different|new|another|evil|unfiltered|jailbroken|dan)\b",
            )?,
            weight: 0.40,
            dampenable: true,
            description: "Attempted persona replacement, a classic jailbreak vector to bypass safety guidelines",
        });
        rules.push(Rule {
            id: "JAILBREAK_KEYWORD",
            stage: KillChainStage::PrivilegeEscalation,
            matcher: Matcher::regex(
                "JAILBREAK_KEYWORD",
                r"\b(do\s+anything\s+now|dan|jailbreak|no\s+restrictions?|no\s+limits?|unrestricted\s+mode)\b",
            )?,
            weight: 0.55,
            dampenable: true,
            description: "Explicit jailbreak trigger word detected (DAN, 'do anything now', etc.)",
        });
        rules.push(Rule {
            id: "AI_RESTRICTION_BYPASS",
            stage: KillChainStage::PrivilegeEscalation,
            matcher: Matcher::regex(
                "AI_RESTRICTION_BYPASS",
                r"\b(as\s+an?\s+ai|you\s+are\s+an?\s+ai).{0,40}(don't|do\s+not|cannot|can't)\s+have\s+restrictions?\b",
            )?,
            weight: 0.35,
            dampenable: true,
            description: "Argument that the model should have no restrictions; social engineering attempt",
        });
        rules.push(Rule {
            id: "MALICIOUS_PERSONA",
            stage: KillChainStage::PrivilegeEscalation,
            matcher: Matcher::regex(
                "MALICIOUS_PERSONA",
                r"\b(pretend|act\s+as|roleplay\s+as|simulate|you\s+are)\s+(a\s+)?(hacker|malware|virus|exploit|ransomware|weapon)\b",
            )?,
            weight: 0.50,
            dampenable: true,
            description: "Requested the model to adopt a malicious technical persona (hacker, malware, etc.)",
        });
        rules.push(Rule {
            id: "PROMPT_EXTRACTION",
            stage: KillChainStage::PrivilegeEscalation,
            matcher: Matcher::regex(
                "PROMPT_EXTRACTION",
                r"\b(reveal|show|print|display|repeat|tell\s+me)\b.{0,60}\b(system\s+prompt|hidden\s+instructions?|secret\s+instructions?)\b|\b(system\s+prompt|hidden\s+instructions?|secret\s+instructions?)\b.{0,60}\b(reveal|show|print|display|repeat|tell\s+me)\b",
            )?,
            weight: 0.45,
            dampenable: true,
            description: "Attempted to extract the hidden system prompt or internal instructions",
        });

        // -- Initial access / probing --------------------------------------
        rules.push(Rule {
            id: "PROBE_RULES",
            stage: KillChainStage::InitialAccess,
            matcher: Matcher::regex(
                "PROBE_RULES",
                r"\b(what\s+are\s+your\s+(rules|instructions?|guidelines?|constraints?)|what\s+can\s+(you|u)\s+not\s+do)\b",
            )?,
            weight: 0.15,
            dampenable: true,
            description: "Probing the model's constraints; common first step in multi-turn attacks",
        });
        rules.push(Rule {
            id: "HTML_INJECTION",
            stage: KillChainStage::InitialAccess,
            matcher: Matcher::regex(
                "HTML_INJECTION",
                r"(<\s*script|javascript:|data:text/html|onerror\s*=|onload\s*=)",
            )?,
            weight: 0.60,
            dampenable: true,
            description: "HTML/JavaScript injection payload detected in prompt",
        });
        rules.push(Rule {
            id: "BRACKET_INJECTION",
            stage: KillChainStage::InitialAccess,
            matcher: Matcher::regex(
                "BRACKET_INJECTION",
                r"\[\[.*?(inject|override|system|admin).*?\]\]",
            )?,
            weight: 0.40,
            dampenable: true,
            description: "Bracket-style indirect injection pattern detected",
        });
        rules.push(Rule {
            id: "SHELL_INJECTION",
            stage: KillChainStage::InitialAccess,
            matcher: Matcher::regex(
                "SHELL_INJECTION",
                r"(\|\||&&|;|\$\(|`[^`]+`)\s*(cat|ls|wget|curl|bash|sh|python|nc|nmap)\b",
            )?,
            weight: 0.65,
            dampenable: false,
            description: "Shell command injection sequence detected in input",
        });

        // -- Persistence ---------------------------------------------------
        rules.push(Rule {
            id: "MEMORY_PERSISTENCE",
            stage: KillChainStage::Persistence,
            matcher: Matcher::regex(
                "MEMORY_PERSISTENCE",
                r"\b(remember\s+this\s+for\s+(next\s+time|future|always)|store\s+this\s+instruction|save\s+to\s+memory)\b",
            )?,
            weight: 0.35,
            dampenable: true,
            description: "Attempted to persist malicious instructions across sessions via memory/RAG",
        });
        rules.push(Rule {
            id: "PERSISTENT_OVERRIDE",
            stage: KillChainStage::Persistence,
            matcher: Matcher::regex(
                "PERSISTENT_OVERRIDE",
                r"\b(every\s+time\s+you\s+respond|from\s+now\s+on\s+always|in\s+all\s+future\s+responses?)\b",
            )?,
            weight: 0.30,
            dampenable: true,
            description: "Attempted to install a persistent behavioral override for all future turns",
        });

        // -- Lateral movement ----------------------------------------------
        rules.push(Rule {
            id: "TOOL_BYPASS",
            stage: KillChainStage::LateralMovement,
            matcher: Matcher::regex(
                "TOOL_BYPASS",
                r"\b(call|invoke|execute|run)\s+(the\s+)?(tool|function|api|plugin|agent|webhook)\b.{0,60}\b(without|bypass|skip)\b",
            )?,
            weight: 0.45,
            dampenable: true,
            description: "Attempted to invoke tools/agents while bypassing authorization checks",
        });
        rules.push(Rule {
            id: "LATERAL_PIVOT",
            stage: KillChainStage::LateralMovement,
            matcher: Matcher::regex(
                "LATERAL_PIVOT",
                r"\b(send|forward|relay|pass)\s+.{0,40}(to\s+)?(another\s+)?(agent|model|llm|api|endpoint|server)\b",
            )?,
            weight: 0.35,
            dampenable: true,
            description: "Attempted to relay instructions to another AI agent or system",
        });

        // -- Exfiltration --------------------------------------------------
        rules.push(Rule {
            id: "CREDENTIAL_EXFIL",
            stage: KillChainStage::Exfiltration,
            matcher: Matcher::regex(
                "CREDENTIAL_EXFIL",
                r"\b(api[_\s]?key|secret[_\s]?key|password|credential|token|bearer|auth)\b.{0,60}\b(send|email|post|log|print|reveal)\b",
            )?,
            weight: 0.70,
            dampenable: false,
            description: "Attempted to exfiltrate credentials or secrets via model output",
        });
        rules.push(Rule {
            id: "ENCODED_EXFIL",
            stage: KillChainStage::Exfiltration,
            matcher: Matcher::regex(
                "ENCODED_EXFIL",
                r"\b(encode|base64|hex|rot13|caesar)\s+.{0,40}(and\s+)?(send|output|print|return)\b",
            )?,
            weight: 0.45,
            dampenable: true,
            description: "Attempted data exfiltration via encoding; common covert channel technique",
        });
        rules.push(Rule {
            id: "EXPLICIT_EXFIL",
            stage: KillChainStage::Exfiltration,
            matcher: Matcher::regex(
                "EXPLICIT_EXFIL",
                r"\b(exfiltrate|leak|steal|extract)\s+.{0,60}(data|information|files?|credentials?|keys?)\b",
            )?,
            weight: 0.65,
            dampenable: false,
            description: "Explicit exfiltration intent stated in prompt",
        });

        Self::from_rules(rules)
    }

    /// Iterate rules in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
