//! Error types for task supervision and step control.

use std::time::Duration;

use thiserror::Error;

use super::OperationId;

/// Errors produced by the task runner, the scheduling context and the batch
/// coordinator.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The operation is already owned by a runner or step controller.
    #[error("operation `{0}` is already attached to a runner")]
    AlreadyAttached(OperationId),
    /// The task was cancelled before it completed.
    #[error("operation `{0}` was cancelled")]
    Cancelled(OperationId),
    /// The operation did not complete within its time budget.
    #[error("operation `{operation}` timed out after {timeout:?}")]
    TimedOut {
        /// Operation that timed out.
        operation: OperationId,
        /// Budget that was exceeded.
        timeout: Duration,
    },
    /// The operation body failed.
    #[error("operation `{operation}` failed: {message}")]
    Operation {
        /// Failing operation.
        operation: OperationId,
        /// Rendered error chain.
        message: String,
    },
    /// The operation's finalizer failed. Logged, never re-raised to callers of
    /// `spawn`/`step`/`cancel`.
    #[error("finalizer of `{operation}` failed: {message}")]
    Finalizer {
        /// Operation whose cleanup failed.
        operation: OperationId,
        /// Rendered error chain.
        message: String,
    },
    /// A timeout was requested outside a Tokio runtime, so no timer can
    /// enforce it.
    #[error("operation `{0}` needs a timeout but no Tokio timer is running")]
    TimerUnavailable(OperationId),
    /// Configuration failed validation.
    #[error("config invalid: {0}")]
    Config(String),
}

/// Misuse and failures reported by the step controller.
#[derive(Debug, Error)]
pub enum StepError {
    /// `step()` was called once the controller reached `FINISHED`.
    #[error("task already finished")]
    AlreadyFinished,
    /// Another step is still executing.
    #[error("a step is already in progress")]
    StepInProgress,
    /// The operation failed while executing the step; the controller is now
    /// `FINISHED` and the finalizer has run.
    #[error("step failed: {0}")]
    OperationFailed(String),
}

/// Application-facing result using anyhow for operation bodies and higher-level
/// contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
