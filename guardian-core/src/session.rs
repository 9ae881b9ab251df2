//! Per-session threat state and the session scorer.
//!
//! Sessions live in a concurrent map keyed by session id; each entry is
//! guarded by its own mutex so the scorer's read-decay-update-write runs as
//! one transaction per session while unrelated sessions proceed in
//! parallel. No global lock is held during an update.
//!
//! The decay and combine steps are standalone pure functions so the scoring
//! math is unit-testable without a live store.

use crate::config::{DecayConfig, SessionConfig};
use crate::drift::DriftHeuristic;
use crate::scanner::ScanResult;
use crate::types::KillChainStage;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Mutable per-session threat state. Owned exclusively by the store; one
/// instance per session id, created lazily on first message.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    /// Cumulative threat score, always >= 0.
    pub score: f64,
    /// Dominant kill-chain stage; monotonically non-decreasing within a
    /// session unless externally reset.
    pub stage: KillChainStage,
    pub last_updated: DateTime<Utc>,
    pub turn_count: u64,
    /// Bounded most-recent-N message prefixes, oldest first.
    pub recent_messages: VecDeque<String>,
}

impl SessionState {
    fn new(session_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.to_string(),
            score: 0.0,
            stage: KillChainStage::Clean,
            last_updated: now,
            turn_count: 0,
            recent_messages: VecDeque::new(),
        }
    }
}

/// Immutable snapshot of a session's state after an update, handed to the
/// mitigator and router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    /// Total score after this update (decayed prior + raw + drift, clamped).
    pub score: f64,
    /// The non-rule contribution of this update (decayed prior + drift),
    /// kept separate so the mitigator can recompute a dampened total.
    pub carried_score: f64,
    pub stage: KillChainStage,
    pub turn_count: u64,
    pub last_updated: DateTime<Utc>,
}

/// Exponential time-decay of a stored score:
/// `stored * factor^(elapsed / half_life)`. Models fading threat relevance
/// between turns while preserving escalation within a short attack window.
pub fn decay_score(stored: f64, elapsed_secs: f64, decay: &DecayConfig) -> f64 {
    if stored <= 0.0 {
        return 0.0;
    }
    let exponent = elapsed_secs.max(0.0) / decay.half_life_secs;
    stored * decay.factor.powf(exponent)
}

/// Combine the decayed prior with fresh signals, clamped to the ceiling.
pub fn combine_score(decayed: f64, raw_score: f64, drift_score: f64, ceiling: f64) -> f64 {
    (decayed + raw_score + drift_score).clamp(0.0, ceiling)
}

/// Concurrent map of session states with per-key locking.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<SessionState>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or lazily create the lock entry for a session. The map shard
    /// guard is released before the caller awaits the session mutex.
    fn entry(&self, session_id: &str, now: DateTime<Utc>) -> Arc<Mutex<SessionState>> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SessionState::new(session_id, now))))
            .value()
            .clone()
    }

    /// Remove a session entirely. The next message for this id lazily
    /// recreates it from scratch (external eviction/reset hook).
    pub fn reset(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Read-only snapshot of a session, if present.
    pub async fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        let entry = self.sessions.get(session_id)?.value().clone();
        let state = entry.lock().await;
        Some(SessionSnapshot {
            session_id: state.session_id.clone(),
            score: state.score,
            carried_score: 0.0,
            stage: state.stage,
            turn_count: state.turn_count,
            last_updated: state.last_updated,
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Combines scan results, the drift signal, and the decayed prior score
/// into an updated session state. The only component that mutates shared
/// state; all of its work happens under the per-session lock.
pub struct SessionScorer {
    store: Arc<SessionStore>,
    drift: Box<dyn DriftHeuristic>,
    decay: DecayConfig,
    session: SessionConfig,
}

impl SessionScorer {
    pub fn new(
        store: Arc<SessionStore>,
        drift: Box<dyn DriftHeuristic>,
        decay: DecayConfig,
        session: SessionConfig,
    ) -> Self {
        Self {
            store,
            drift,
            decay,
            session,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Apply one message's scan result to the session and return the
    /// updated snapshot.
    pub async fn update(
        &self,
        session_id: &str,
        message: &str,
        scan: &ScanResult,
    ) -> SessionSnapshot {
        self.update_at(session_id, message, scan, Utc::now()).await
    }

    /// Same as `update`, with an explicit clock for decay tests.
    pub(crate) async fn update_at(
        &self,
        session_id: &str,
        message: &str,
        scan: &ScanResult,
        now: DateTime<Utc>,
    ) -> SessionSnapshot {
        let entry = self.store.entry(session_id, now);

        // Uncontended fast path; on contention, wait for the in-flight
        // update to finish and re-read fresh state.
        let mut state = match entry.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(session_id, "session busy, waiting for in-flight update");
                entry.lock().await
            }
        };

        let elapsed_secs = (now - state.last_updated).num_milliseconds().max(0) as f64 / 1000.0;
        let decayed = if state.turn_count == 0 {
            0.0
        } else {
            decay_score(state.score, elapsed_secs, &self.decay)
        };

        // Drift is computed inside the transaction so a concurrent message
        // for the same session cannot observe a half-updated history.
        let mut history: Vec<String> = state.recent_messages.iter().cloned().collect();
        history.push(message.to_string());
        let drift_score = self.drift.detect_drift(&history);

        let ceiling = self.session.max_score;
        state.score = combine_score(decayed, scan.raw_score, drift_score, ceiling);
        // Stages only escalate from automated updates.
        state.stage = state.stage.max(scan.dominant_stage);
        state.turn_count += 1;
        state.last_updated = now;

        let prefix: String = message.chars().take(self.session.stored_prefix_chars).collect();
        state.recent_messages.push_back(prefix);
        while state.recent_messages.len() > self.session.history_window {
            state.recent_messages.pop_front();
        }

        SessionSnapshot {
            session_id: state.session_id.clone(),
            score: state.score,
            carried_score: (decayed + drift_score).min(ceiling),
            stage: state.stage,
            turn_count: state.turn_count,
            last_updated: state.last_updated,
        }
    }
}
