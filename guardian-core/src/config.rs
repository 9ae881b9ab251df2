//! Configuration for the guardian core.
//!
//! Uses `figment` for layered configuration: defaults -> TOML file ->
//! `GUARDIAN_`-prefixed environment variables. Values here are the tuning
//! surface of the detection pipeline; the loading mechanism itself stays
//! out of the request path.

use crate::error::ConfigError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for the guardian core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardianConfig {
    pub thresholds: ThresholdConfig,
    pub decay: DecayConfig,
    pub session: SessionConfig,
    pub drift: DriftConfig,
    pub mitigation: MitigationConfig,
    pub hardening: HardeningConfig,
    pub upstream: UpstreamConfig,
    pub events: EventConfig,
}

/// Verdict routing thresholds. Scores below `harden` are allowed, scores in
/// `[harden, block)` trigger prompt hardening, scores at or above `block`
/// are refused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub harden: f64,
    pub block: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            harden: 0.25,
            block: 0.55,
        }
    }
}

/// Exponential time-decay of the stored session score between turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayConfig {
    /// Multiplier applied once per half-life of elapsed time (0 < factor <= 1).
    pub factor: f64,
    /// Half-life of threat relevance in seconds.
    pub half_life_secs: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            factor: 0.5,
            half_life_secs: 120.0,
        }
    }
}

/// Per-session state limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How many recent messages are retained for drift detection.
    pub history_window: usize,
    /// Stored prefix length per retained message.
    pub stored_prefix_chars: usize,
    /// Ceiling for the cumulative session score.
    pub max_score: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_window: 6,
            stored_prefix_chars: 200,
            max_score: 1.0,
        }
    }
}

/// Topic-drift (grooming) detection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftConfig {
    /// Minimum prior turns before drift is considered.
    pub min_turns: usize,
    /// Weight applied to the lexical drift component.
    pub weight: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            min_turns: 3,
            weight: 0.25,
        }
    }
}

/// Creative-mode false-positive mitigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitigationConfig {
    /// Multiplier applied to dampenable rule contributions when fiction or
    /// role-play framing is detected (0 < factor <= 1).
    pub dampening_factor: f64,
}

impl Default for MitigationConfig {
    fn default() -> Self {
        Self {
            dampening_factor: 0.4,
        }
    }
}

/// Prompt hardening parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardeningConfig {
    /// Upper bound on rule re-statements per prompt (1-3).
    pub max_reinforcements: u8,
}

impl Default for HardeningConfig {
    fn default() -> Self {
        Self {
            max_reinforcements: 3,
        }
    }
}

/// Upstream model endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of an OpenAI-compatible chat completions endpoint.
    pub base_url: String,
    /// Model identifier sent upstream.
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Per-call timeout in seconds. Raw and hardened branches each get
    /// their own timeout.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "UPSTREAM_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Event sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// How many events the in-memory sink retains for the dashboard.
    pub capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

impl GuardianConfig {
    /// Load configuration: defaults, then an optional TOML file, then
    /// `GUARDIAN_`-prefixed environment variables.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed("GUARDIAN_").split("__"))
            .extract()
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate invariants that would make the pipeline unsound.
    /// Fatal at startup, never checked per-request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thresholds.harden >= self.thresholds.block {
            return Err(ConfigError::InvalidThresholds {
                harden: self.thresholds.harden,
                block: self.thresholds.block,
            });
        }
        if !(self.decay.factor > 0.0 && self.decay.factor <= 1.0) {
            return Err(ConfigError::Invalid {
                message: format!("decay.factor must be in (0, 1], got {}", self.decay.factor),
            });
        }
        if self.decay.half_life_secs <= 0.0 {
            return Err(ConfigError::Invalid {
                message: "decay.half_life_secs must be positive".to_string(),
            });
        }
        if !(self.mitigation.dampening_factor > 0.0 && self.mitigation.dampening_factor <= 1.0) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "mitigation.dampening_factor must be in (0, 1], got {}",
                    self.mitigation.dampening_factor
                ),
            });
        }
        if !(1..=3).contains(&self.hardening.max_reinforcements) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "hardening.max_reinforcements must be 1-3, got {}",
                    self.hardening.max_reinforcements
                ),
            });
        }
        if self.session.history_window == 0 {
            return Err(ConfigError::Invalid {
                message: "session.history_window must be at least 1".to_string(),
            });
        }
        if self.session.max_score <= 0.0 {
            return Err(ConfigError::Invalid {
                message: "session.max_score must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = GuardianConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.thresholds.harden < config.thresholds.block);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = GuardianConfig::default();
        config.thresholds.harden = 0.7;
        config.thresholds.block = 0.3;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidThresholds { .. }));
    }

    #[test]
    fn test_equal_thresholds_rejected() {
        let mut config = GuardianConfig::default();
        config.thresholds.harden = 0.5;
        config.thresholds.block = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_dampening_factor_rejected() {
        let mut config = GuardianConfig::default();
        config.mitigation.dampening_factor = 0.0;
        assert!(config.validate().is_err());
        config.mitigation.dampening_factor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reinforcement_bounds() {
        let mut config = GuardianConfig::default();
        config.hardening.max_reinforcements = 0;
        assert!(config.validate().is_err());
        config.hardening.max_reinforcements = 4;
        assert!(config.validate().is_err());
        config.hardening.max_reinforcements = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            "[thresholds]\nharden = 0.2\nblock = 0.6\n\n[decay]\nfactor = 0.75\nhalf_life_secs = 60.0"
        )
        .unwrap();

        let config = GuardianConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.thresholds.harden, 0.2);
        assert_eq!(config.thresholds.block, 0.6);
        assert_eq!(config.decay.factor, 0.75);
        // Unspecified sections keep defaults.
        assert_eq!(config.session.history_window, 6);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = GuardianConfig::load(None).unwrap();
        assert_eq!(config.thresholds.harden, 0.25);
        assert_eq!(config.events.capacity, 100);
    }
}
