//! Tests for error rendering

use lab_sequencer::core::{OperationId, StepError, TaskError};
use std::time::Duration;

#[test]
fn test_task_error_messages() {
    let id = OperationId::from("k617");
    assert_eq!(
        TaskError::AlreadyAttached(id.clone()).to_string(),
        "operation `k617` is already attached to a runner"
    );
    assert_eq!(
        TaskError::Cancelled(id.clone()).to_string(),
        "operation `k617` was cancelled"
    );
    assert_eq!(
        TaskError::TimedOut {
            operation: id.clone(),
            timeout: Duration::from_millis(1500),
        }
        .to_string(),
        "operation `k617` timed out after 1.5s"
    );
    assert_eq!(
        TaskError::Operation {
            operation: id.clone(),
            message: "GPIB timeout".into(),
        }
        .to_string(),
        "operation `k617` failed: GPIB timeout"
    );
    assert_eq!(
        TaskError::TimerUnavailable(id.clone()).to_string(),
        "operation `k617` needs a timeout but no Tokio timer is running"
    );
    assert_eq!(
        TaskError::Finalizer {
            operation: id,
            message: "bias supply not responding".into(),
        }
        .to_string(),
        "finalizer of `k617` failed: bias supply not responding"
    );
}

#[test]
fn test_step_error_messages() {
    assert_eq!(StepError::AlreadyFinished.to_string(), "task already finished");
    assert_eq!(StepError::StepInProgress.to_string(), "a step is already in progress");
    assert_eq!(
        StepError::OperationFailed("GPIB timeout".into()).to_string(),
        "step failed: GPIB timeout"
    );
}

#[test]
fn test_task_error_converts_into_anyhow() {
    let err: anyhow::Error = TaskError::Config("runner invalid".into()).into();
    assert!(err.downcast_ref::<TaskError>().is_some());
}
