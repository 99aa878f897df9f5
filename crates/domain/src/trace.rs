use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::conflict::{ConflictKind, ConflictSeverity};

/// Structured trace events emitted across the scheduler crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ItemAdded {
        item_id: Uuid,
        item_type: String,
        scheduled_for: DateTime<Utc>,
        warnings: usize,
    },
    ConflictDetected {
        item_id: Uuid,
        kind: ConflictKind,
        severity: ConflictSeverity,
        with: Vec<Uuid>,
    },
    ItemProcessed {
        item_id: Uuid,
        success: bool,
        attempt: u32,
        duration_ms: u64,
    },
    RetryScheduled {
        item_id: Uuid,
        retry_count: u32,
        next_attempt: DateTime<Utc>,
    },
    ItemFailed {
        item_id: Uuid,
        retry_count: u32,
        error: String,
    },
    RecurrenceSpawned {
        parent_id: Uuid,
        item_id: Uuid,
        scheduled_for: DateTime<Utc>,
    },
    OptimizationCompleted {
        items: usize,
        changes: usize,
        cycles: usize,
        concurrency_reduction: i64,
    },
    PollCompleted {
        due: usize,
        dispatched: usize,
        duration_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "cs_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged() {
        let event = TraceEvent::PollCompleted {
            due: 2,
            dispatched: 1,
            duration_ms: 5,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"PollCompleted\""));
        assert!(json.contains("\"dispatched\":1"));
    }
}
