//! Dashboard event types and the in-memory sink.
//!
//! Rule matches, verdicts, and dual-call comparison records are published
//! here for observability. Emission is fire-and-forget: a full or slow sink
//! never blocks or fails the request path.

use crate::types::{DualCallRecord, KillChainStage, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

/// Events emitted by the guardian to dashboard consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GuardianEvent {
    /// A message was classified.
    ThreatDetected {
        session_id: String,
        mitigated_score: f64,
        stage: KillChainStage,
        verdict: Verdict,
        rule_ids: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    /// A message was refused without upstream dispatch.
    MessageBlocked {
        session_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// A raw-vs-hardened comparison completed.
    DualCallCompleted { record: DualCallRecord },
    /// A session's state was reset.
    SessionReset {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
}

/// A destination for guardian events. Implementations must not block the
/// caller; drop or buffer internally instead.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: GuardianEvent);
}

/// Bounded in-memory ring of recent events, oldest evicted first. Backs the
/// dashboard's "recent activity" view.
pub struct InMemoryEventSink {
    capacity: usize,
    events: Mutex<VecDeque<GuardianEvent>>,
}

impl InMemoryEventSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    /// Snapshot of retained events, oldest first.
    pub fn recent(&self) -> Vec<GuardianEvent> {
        match self.events.lock() {
            Ok(guard) => guard.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self.events.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, event: GuardianEvent) {
        debug!(?event, "guardian event");
        let mut guard = match self.events.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.len() == self.capacity {
            guard.pop_front();
        }
        guard.push_back(event);
    }
}

/// Discards everything. Used when no dashboard is attached.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: GuardianEvent) {}
}
