//! Append-only forensic audit log.
//!
//! Every guardrail verdict, kill-switch action, and engine state transition
//! appends one entry here. Entries are never rewritten or deleted; an
//! external audit store drains them via the read accessors.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use crate::models::ExecutionStage;

/// One audit entry.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// Correlation ID of the flow (or evaluation) this entry belongs to.
    pub correlation_id: Uuid,
    /// Event name, e.g. `stage_transition`, `guardrail_evaluated`,
    /// `kill_switch_tripped`.
    pub event: String,
    /// Stage before a transition, when applicable.
    pub prior_stage: Option<ExecutionStage>,
    /// Stage after a transition, when applicable.
    pub new_stage: Option<ExecutionStage>,
    /// Who caused the entry (component name or operator identity).
    pub actor: String,
    /// Structured event payload.
    pub payload: Value,
    /// Nanoseconds since the log's monotonic epoch. Orders entries even if
    /// the wall clock steps.
    pub monotonic_ns: u64,
    /// Wall-clock timestamp.
    pub recorded_at: DateTime<Utc>,
}

/// Shared append-only audit log.
///
/// Concurrent flows append without coordination beyond the atomicity of a
/// single append.
#[derive(Debug)]
pub struct AuditLog {
    epoch: Instant,
    entries: Mutex<Vec<AuditEntry>>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    /// Create an empty log anchored at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Append an entry. Timestamps are taken at append time.
    pub fn append(
        &self,
        correlation_id: Uuid,
        event: impl Into<String>,
        actor: impl Into<String>,
        payload: Value,
    ) {
        self.append_transition(correlation_id, event, None, None, actor, payload);
    }

    /// Append a stage-transition entry.
    pub fn append_transition(
        &self,
        correlation_id: Uuid,
        event: impl Into<String>,
        prior_stage: Option<ExecutionStage>,
        new_stage: Option<ExecutionStage>,
        actor: impl Into<String>,
        payload: Value,
    ) {
        let entry = AuditEntry {
            correlation_id,
            event: event.into(),
            prior_stage,
            new_stage,
            actor: actor.into(),
            payload,
            monotonic_ns: self.epoch.elapsed().as_nanos() as u64,
            recorded_at: Utc::now(),
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    /// All entries, in append order.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Entries for one correlation ID, in append order.
    #[must_use]
    pub fn entries_for(&self, correlation_id: Uuid) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|e| {
                e.iter()
                    .filter(|entry| entry.correlation_id == correlation_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of entries appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns true if no entries have been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
