//! # Guardian Core
//!
//! Core library for the KillChain Guardian LLM proxy.
//! Provides prompt-injection detection (rule scanning, per-session scoring
//! with time decay, topic-drift detection), creative-mode mitigation,
//! verdict routing, prompt hardening, and dual-call upstream orchestration.

pub mod config;
pub mod drift;
pub mod engine;
pub mod error;
pub mod events;
pub mod hardener;
pub mod mitigator;
pub mod orchestrator;
pub mod router;
pub mod rules;
pub mod scanner;
pub mod session;
pub mod types;
pub mod upstream;

// Re-export commonly used types at the crate root.
pub use config::GuardianConfig;
pub use drift::{DriftHeuristic, LexicalDriftDetector};
pub use engine::ThreatEngine;
pub use error::{GuardianError, Result};
pub use events::{EventSink, GuardianEvent, InMemoryEventSink, NullEventSink};
pub use hardener::PromptHardener;
pub use mitigator::CreativeModeMitigator;
pub use orchestrator::{Guardian, GuardianReply, SAFE_REFUSAL};
pub use router::VerdictRouter;
pub use rules::{Matcher, Rule, RuleSet};
pub use scanner::{MessageScanner, RuleMatch, ScanResult};
pub use session::{SessionScorer, SessionSnapshot, SessionStore};
pub use types::{
    DualCallRecord, HardenedPrompt, KillChainStage, ThreatResult, Verdict,
};
pub use upstream::{OpenAiCompatibleUpstream, UpstreamProvider};
