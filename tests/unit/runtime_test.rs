//! Tests for runtime adapters and snapshots

use futures::executor::LocalPool;
use lab_sequencer::core::{Operation, SchedulingContext, TaskRunner};
use lab_sequencer::runtime::{health, TaskSnapshot, TokioLocalSpawner};

#[test]
fn test_task_snapshot_tracks_outcome() {
    let mut pool = LocalPool::new();
    let runner = TaskRunner::new(SchedulingContext::new(pool.spawner()));
    let handle = runner
        .spawn(Operation::<()>::new("k617", async { Err(anyhow::anyhow!("overrange")) }))
        .unwrap();

    let pending = TaskSnapshot::capture(&handle);
    assert_eq!(pending.outcome, "pending");
    assert_eq!(pending.reason, None);

    pool.run_until_stalled();

    let settled = TaskSnapshot::capture(&handle);
    assert_eq!(settled.outcome, "failed");
    assert_eq!(settled.reason.as_deref(), Some("overrange"));
    assert!(!settled.cancel_requested);
}

#[test]
fn test_health_reports_attached_operations() {
    let pool = LocalPool::new();
    let runner = TaskRunner::new(SchedulingContext::new(pool.spawner()));
    runner.spawn(Operation::new("k220", async { Ok(()) })).unwrap();

    let report = health(runner.context());
    assert!(report.ok);
    assert_eq!(report.attached, 1);
}

#[tokio::test]
async fn test_tokio_local_spawner_runs_inside_local_set() {
    let local = tokio::task::LocalSet::new();
    let value = local
        .run_until(async {
            let runner = TaskRunner::new(SchedulingContext::new(TokioLocalSpawner::new()));
            let handle = runner.spawn(Operation::new("local", async { Ok(7_u8) })).unwrap();
            handle.settled().await.value().copied()
        })
        .await;
    assert_eq!(value, Some(7));
}
