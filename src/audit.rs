//! Fire-and-forget audit trail for analysis calls.
//!
//! One entry per capability call attempt. Recording never fails and the
//! pipeline never depends on storage succeeding.

use crate::models::TaskId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use tracing::debug;

/// Structured record of one analysis call attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub agent: TaskId,
    pub timestamp: DateTime<Utc>,
    pub prompt_chars: usize,
    pub response_chars: usize,
    pub latency_ms: u64,
    /// Which attempt this was (1-based).
    pub attempt: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
}

/// In-memory audit sink.
#[derive(Default)]
pub struct AuditTrail {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry. Never fails; a poisoned lock only drops the entry.
    pub fn record(&self, entry: AuditEntry) {
        debug!(
            "audit: {} attempt {} latency {}ms response {} chars",
            entry.agent, entry.attempt, entry.latency_ms, entry.response_chars
        );
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    /// Snapshot of all recorded entries.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let trail = AuditTrail::new();
        trail.record(AuditEntry {
            agent: TaskId::Financial,
            timestamp: Utc::now(),
            prompt_chars: 1200,
            response_chars: 300,
            latency_ms: 1500,
            attempt: 1,
            prompt_tokens: Some(350),
            completion_tokens: Some(90),
        });

        let entries = trail.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].agent, TaskId::Financial);
        assert_eq!(entries[0].attempt, 1);
    }
}
