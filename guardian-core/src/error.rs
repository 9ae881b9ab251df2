//! Error types for the guardian core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the configuration and upstream dispatch domains. Session
//! updates cannot fail: per-session locking serializes them.

/// Top-level error type for the guardian core library.
#[derive(Debug, thiserror::Error)]
pub enum GuardianError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors detected while validating or loading configuration.
///
/// All of these are fatal at startup; none occur per-request.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Harden threshold ({harden}) must be strictly below block threshold ({block})")]
    InvalidThresholds { harden: f64, block: f64 },

    #[error("Rule set is empty; at least one detection rule is required")]
    EmptyRuleSet,

    #[error("Duplicate rule id: {id}")]
    DuplicateRuleId { id: String },

    #[error("Invalid rule pattern for '{id}': {message}")]
    InvalidPattern { id: String, message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from upstream model dispatch.
///
/// Surfaced to the transport layer only when the client-facing branch is
/// affected; comparison-branch failures are absorbed into the record.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Upstream request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Upstream request failed: {message}")]
    ApiRequest { message: String },

    #[error("Upstream response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for upstream {provider}")]
    AuthFailed { provider: String },
}

impl UpstreamError {
    /// Whether the transport layer may retry the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::ApiRequest { .. })
    }
}

/// A type alias for results using the top-level `GuardianError`.
pub type Result<T> = std::result::Result<T, GuardianError>;
