//! Tests for builders

use futures::executor::LocalPool;
use lab_sequencer::builders::SequencerBuilder;
use lab_sequencer::config::{RunnerConfig, SequencerConfig};
use lab_sequencer::core::{InMemoryAuditSink, Operation, StepStatus, TaskError};
use parking_lot::Mutex;
use std::sync::Arc;

#[test]
fn test_build_with_defaults() {
    let pool = LocalPool::new();
    let seq = SequencerBuilder::new().build(pool.spawner()).unwrap();
    assert_eq!(seq.config(), &SequencerConfig::default());
    assert_eq!(seq.context().attached_count(), 0);
}

#[test]
fn test_build_rejects_invalid_config() {
    let pool = LocalPool::new();
    let cfg = SequencerConfig {
        runner: RunnerConfig {
            default_timeout_ms: Some(0),
            ..RunnerConfig::default()
        },
        ..SequencerConfig::default()
    };
    let err = SequencerBuilder::new().config(cfg).build(pool.spawner()).err().unwrap();
    assert!(matches!(err, TaskError::Config(_)));
    assert!(err.to_string().contains("config invalid"));
}

#[test]
fn test_components_share_one_context() {
    let mut pool = LocalPool::new();
    let sink = Arc::new(Mutex::new(InMemoryAuditSink::new(16)));
    let seq = SequencerBuilder::new()
        .audit(sink.clone())
        .build(pool.spawner())
        .unwrap();

    let (_tx, rx) = futures::channel::oneshot::channel::<()>();
    let handle = seq
        .runner()
        .spawn(Operation::new("shared", async move { Ok(rx.await?) }))
        .unwrap();
    assert!(seq.step_controller(Operation::new("shared", async { Ok(()) })).is_err());
    assert!(seq.coordinator().runner().context().is_attached(handle.id()));

    let ctl = seq.step_controller(Operation::new("other", async { Ok(()) })).unwrap();
    assert_eq!(pool.run_until(ctl.step()).unwrap(), StepStatus::Finished);
    assert!(!sink.lock().events().is_empty());
}
