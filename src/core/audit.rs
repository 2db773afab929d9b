//! Lifecycle audit trail.
//!
//! Every component records what it did to an operation (spawned, settled,
//! cancelled, finalized, changed status) through an [`AuditSink`]. The sink
//! lives behind an `Arc<parking_lot::Mutex<_>>` so a presentation or logging
//! thread can read it while the scheduler thread keeps writing.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::util::clock::now_ms;

use super::OperationId;

/// Audit event structure.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Operation the event refers to.
    pub operation: OperationId,
    /// Invocation of the operation.
    pub run_id: Uuid,
    /// Action taken (spawn, settle, cancel, finalize, status).
    pub action: String,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context (outcome label, new status, failure text).
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// Audit sink shared between the scheduler thread and readers.
pub type SharedAuditSink = Arc<Mutex<dyn AuditSink>>;

/// In-memory audit sink for testing and operator log panels.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }

    /// Actions recorded for one operation, oldest first.
    pub fn actions_for(&self, operation: &OperationId) -> Vec<String> {
        self.events
            .iter()
            .filter(|e| &e.operation == operation)
            .map(|e| e.action.clone())
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    operation: &OperationId,
    run_id: Uuid,
    action: impl Into<String>,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: Uuid::new_v4().to_string(),
        operation: operation.clone(),
        run_id,
        action: action.into(),
        created_at_ms: now_ms(),
        detail,
    }
}
