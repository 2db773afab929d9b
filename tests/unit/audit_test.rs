//! Tests for audit sink

use lab_sequencer::core::{build_audit_event, AuditSink, InMemoryAuditSink, OperationId};
use uuid::Uuid;

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);
    let id = OperationId::from("k220");
    let run_id = Uuid::new_v4();

    sink.record(build_audit_event(&id, run_id, "spawn", None));
    sink.record(build_audit_event(&id, run_id, "settle", Some("done".to_string())));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].operation, id);
    assert_eq!(events[0].run_id, run_id);
    assert_eq!(events[1].detail.as_deref(), Some("done"));
    assert_ne!(events[0].event_id, events[1].event_id);
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);
    let run_id = Uuid::new_v4();

    for name in ["a", "b", "c"] {
        sink.record(build_audit_event(&OperationId::from(name), run_id, "spawn", None));
    }

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].operation.as_str(), "b"); // First one popped
    assert_eq!(events[1].operation.as_str(), "c");
}

#[test]
fn test_zero_capacity_sink_ignores_events() {
    let mut sink = InMemoryAuditSink::new(0);
    sink.record(build_audit_event(&OperationId::from("a"), Uuid::new_v4(), "spawn", None));
    assert!(sink.events().is_empty());
}

#[test]
fn test_actions_for_filters_by_operation() {
    let mut sink = InMemoryAuditSink::new(10);
    let run_id = Uuid::new_v4();
    let a = OperationId::from("a");
    let b = OperationId::from("b");

    sink.record(build_audit_event(&a, run_id, "spawn", None));
    sink.record(build_audit_event(&b, run_id, "spawn", None));
    sink.record(build_audit_event(&a, run_id, "cancel", None));

    assert_eq!(sink.actions_for(&a), vec!["spawn", "cancel"]);
    assert_eq!(sink.actions_for(&b), vec!["spawn"]);
}

#[test]
fn test_audit_event_serializes() {
    let event = build_audit_event(&OperationId::from("k705"), Uuid::nil(), "status", Some("RUNNING".into()));
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["operation"], "k705");
    assert_eq!(json["action"], "status");
    assert_eq!(json["detail"], "RUNNING");
}
