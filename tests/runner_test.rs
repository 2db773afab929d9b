//! Integration tests for the supervised task runner.
//!
//! This test validates:
//! 1. Spawned operations start on the next scheduling opportunity, not inline
//! 2. Completion callbacks fire once each, in registration order
//! 3. Failures settle the handle and are logged
//! 4. Cancellation is cooperative and runs the finalizer exactly once
//! 5. Timeouts race the body against a Tokio timer
//! 6. A failing finalizer never masks the body's failure

use futures::channel::oneshot;
use futures::executor::{LocalPool, LocalSpawner};
use lab_sequencer::config::RunnerConfig;
use lab_sequencer::core::{
    InMemoryAuditSink, Operation, Outcome, SchedulingContext, TaskError, TaskRunner,
};
use lab_sequencer::runtime::TokioLocalSpawner;
use parking_lot::Mutex;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing_test::traced_test;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn pool_runner(pool: &LocalPool) -> TaskRunner<LocalSpawner> {
    TaskRunner::new(SchedulingContext::new(pool.spawner()))
}

fn counting_finalizer(counter: &Rc<Cell<usize>>) -> impl FnOnce() -> futures::future::Ready<anyhow::Result<()>> {
    let counter = Rc::clone(counter);
    move || {
        counter.set(counter.get() + 1);
        futures::future::ready(Ok(()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[test]
fn test_spawn_does_not_run_inline() {
    let mut pool = LocalPool::new();
    let runner = pool_runner(&pool);
    let started = Rc::new(Cell::new(false));
    let flag = Rc::clone(&started);

    let handle = runner
        .spawn(Operation::new("k617", async move {
            flag.set(true);
            Ok(0.25_f64)
        }))
        .unwrap();

    assert!(!started.get());
    assert!(!handle.is_settled());

    pool.run_until_stalled();

    assert!(started.get());
    assert_eq!(handle.value(), Some(0.25));
}

#[test]
fn test_callbacks_fire_once_in_order_before_and_after_settlement() {
    let mut pool = LocalPool::new();
    let runner = pool_runner(&pool);
    let order = Rc::new(RefCell::new(Vec::new()));

    let handle = runner
        .spawn(Operation::new("meter", async { Ok(5_u32) }))
        .unwrap();
    for tag in ["early-1", "early-2"] {
        let order = Rc::clone(&order);
        handle.on_settled(move |outcome| {
            assert_eq!(outcome.value(), Some(&5));
            order.borrow_mut().push(tag);
        });
    }

    pool.run_until_stalled();
    assert_eq!(*order.borrow(), vec!["early-1", "early-2"]);

    for tag in ["late-1", "late-2"] {
        let order = Rc::clone(&order);
        handle.on_settled(move |_| order.borrow_mut().push(tag));
    }
    assert_eq!(order.borrow().len(), 2, "late callbacks never run inline");

    pool.run_until_stalled();
    assert_eq!(*order.borrow(), vec!["early-1", "early-2", "late-1", "late-2"]);
}

#[traced_test]
#[test]
fn test_failure_settles_and_is_logged() {
    let mut pool = LocalPool::new();
    let runner = pool_runner(&pool);
    let finalized = Rc::new(Cell::new(0));

    let handle = runner
        .spawn(
            Operation::<()>::new("hp8112a", async {
                Err(anyhow::anyhow!("pulse generator offline"))
            })
            .with_finalizer(counting_finalizer(&finalized)),
        )
        .unwrap();

    let outcome = pool.run_until(handle.settled());

    let failure = outcome.failure().expect("failed outcome");
    assert_eq!(failure.message, "pulse generator offline");
    assert_eq!(finalized.get(), 1);
    assert!(logs_contain("task failed"));
    assert!(!logs_contain("no observer attached"));
}

#[traced_test]
#[test]
fn test_failing_finalizer_does_not_mask_body_failure() {
    let mut pool = LocalPool::new();
    let runner = pool_runner(&pool);

    let handle = runner
        .spawn(
            Operation::<()>::new("k220", async { Err(anyhow::anyhow!("compliance reached")) })
                .with_finalizer(|| async { Err(anyhow::anyhow!("output did not disable")) }),
        )
        .unwrap();

    let outcome = pool.run_until(handle.settled());

    assert_eq!(outcome.failure().unwrap().message, "compliance reached");
    assert!(logs_contain("finalizer failed"));
    assert!(logs_contain("output did not disable"));
    assert!(!runner.context().is_attached(handle.id()));
}

#[test]
fn test_join_maps_outcome_to_result() {
    let mut pool = LocalPool::new();
    let runner = pool_runner(&pool);
    let (_tx, rx) = oneshot::channel::<()>();

    let ok = runner.spawn(Operation::new("ok", async { Ok(3_u8) })).unwrap();
    let failed = runner
        .spawn(Operation::<u8>::new("failed", async { Err(anyhow::anyhow!("no response")) }))
        .unwrap();
    let stuck = runner
        .spawn(Operation::new("stuck", async move {
            rx.await?;
            Ok(0_u8)
        }))
        .unwrap();
    runner.cancel(&stuck);

    assert_eq!(pool.run_until(ok.join()).unwrap(), 3);
    let err = pool.run_until(failed.join()).unwrap_err();
    assert!(matches!(err, TaskError::Operation { ref message, .. } if message == "no response"));
    let err = pool.run_until(stuck.join()).unwrap_err();
    assert!(matches!(err, TaskError::Cancelled(ref id) if id.as_str() == "stuck"));
}

#[test]
fn test_panicking_operation_does_not_take_down_scheduler() {
    let mut pool = LocalPool::new();
    let runner = pool_runner(&pool);

    let bad = runner
        .spawn(Operation::<()>::new("bad", async { panic!("relay welded") }))
        .unwrap();
    let good = runner
        .spawn(Operation::new("good", async { Ok("ok") }))
        .unwrap();

    pool.run_until_stalled();

    let outcome = bad.outcome();
    assert!(outcome.failure().unwrap().message.contains("relay welded"));
    assert_eq!(good.value(), Some("ok"));
}

#[test]
fn test_cancel_stops_at_next_suspension_point() {
    let mut pool = LocalPool::new();
    let runner = pool_runner(&pool);
    let finalized = Rc::new(Cell::new(0));
    let progressed = Rc::new(Cell::new(0));
    let counter = Rc::clone(&progressed);
    let (tx, rx) = oneshot::channel::<()>();

    let handle = runner
        .spawn(
            Operation::with_breakpoints("sweep", move |bp| async move {
                counter.set(1);
                rx.await?;
                counter.set(2);
                bp.reached().await;
                counter.set(3);
                Ok(())
            })
            .with_finalizer(counting_finalizer(&finalized)),
        )
        .unwrap();
    pool.run_until_stalled();
    assert_eq!(progressed.get(), 1);

    assert!(runner.cancel(&handle));
    let _ = tx.send(());
    pool.run_until_stalled();

    assert_eq!(*handle.outcome(), Outcome::Cancelled);
    assert_eq!(progressed.get(), 1);
    assert_eq!(finalized.get(), 1);
    assert!(!runner.cancel(&handle));
    assert!(!runner.context().is_attached(handle.id()));
}

#[test]
fn test_breakpoints_are_plain_yields_under_runner() {
    let mut pool = LocalPool::new();
    let runner = pool_runner(&pool);
    let trace = Rc::new(RefCell::new(Vec::new()));

    let mut handles = Vec::new();
    for name in ["a", "b"] {
        let trace = Rc::clone(&trace);
        handles.push(
            runner
                .spawn(Operation::with_breakpoints(name, move |bp| async move {
                    for n in 0..2 {
                        trace.borrow_mut().push(format!("{name}{n}"));
                        bp.reached().await;
                    }
                    Ok(())
                }))
                .unwrap(),
        );
    }

    pool.run_until_stalled();

    assert!(handles.iter().all(|h| h.outcome().is_success()));
    assert_eq!(*trace.borrow(), vec!["a0", "b0", "a1", "b1"]);
}

#[test]
fn test_lifecycle_is_audited() {
    let mut pool = LocalPool::new();
    let sink = Arc::new(Mutex::new(InMemoryAuditSink::new(32)));
    let ctx = SchedulingContext::new(pool.spawner()).with_audit(sink.clone());
    let runner = TaskRunner::new(ctx);

    let handle = runner
        .spawn(Operation::new("k220", async { Ok(()) }).with_finalizer(|| async { Ok(()) }))
        .unwrap();
    pool.run_until_stalled();

    assert!(handle.outcome().is_success());
    assert_eq!(
        sink.lock().actions_for(handle.id()),
        vec!["spawn", "finalize", "settle"]
    );
}

#[test]
fn test_spawn_from_factory_rejects_attached_operation() {
    let pool = LocalPool::new();
    let runner = pool_runner(&pool);
    let (_tx, rx) = oneshot::channel::<()>();

    runner
        .spawn_from(|| Operation::new("bias", async move { Ok(rx.await?) }))
        .unwrap();
    let err = runner
        .spawn_from(|| Operation::new("bias", async { Ok(()) }))
        .unwrap_err();

    assert!(matches!(err, TaskError::AlreadyAttached(ref id) if id.as_str() == "bias"));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fails_task_and_finalizes() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let runner = TaskRunner::new(SchedulingContext::new(TokioLocalSpawner::new()));
            let finalized = Rc::new(Cell::new(0));

            let handle = runner
                .spawn_with_timeout(
                    Operation::new("slow-read", async {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                        Ok(1.0_f64)
                    })
                    .with_finalizer(counting_finalizer(&finalized)),
                    Duration::from_secs(3),
                )
                .unwrap();

            let outcome = handle.settled().await;
            let failure = outcome.failure().expect("timed out");
            assert!(failure.message.contains("timed out after 3s"));
            assert_eq!(finalized.get(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_default_timeout_from_config() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let runner = TaskRunner::with_config(
                SchedulingContext::new(TokioLocalSpawner::new()),
                RunnerConfig {
                    default_timeout_ms: Some(500),
                    ..RunnerConfig::default()
                },
            );

            let fast = runner
                .spawn(Operation::new("fast", async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(())
                }))
                .unwrap();
            let slow = runner
                .spawn(Operation::new("slow", async {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok(())
                }))
                .unwrap();

            assert!(fast.settled().await.is_success());
            assert!(slow.settled().await.failure().is_some());
        })
        .await;
}
