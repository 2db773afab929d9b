//! Supervised task runner.
//!
//! [`TaskRunner::spawn`] turns an [`Operation`] into a scheduled unit of work and
//! returns a pending [`TaskHandle`] immediately. The supervising future:
//!
//! 1. checks for a cancellation request before every resumption of the body,
//! 2. races the body against an optional timeout,
//! 3. runs the finalizer exactly once, whatever happened,
//! 4. releases the operation identity and settles the handle.
//!
//! Failures are always logged together with their captured trace. A failure
//! that settles while nobody observes the handle additionally produces a
//! supervision warning, so fire-and-forget tasks cannot die silently.

use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;

use uuid::Uuid;

use crate::config::RunnerConfig;

use super::handle::{Outcome, TaskFailure, TaskHandle};
use super::operation::{run_finalizer, Operation, OperationBody};
use super::scheduler::{SchedulingContext, Spawn};
use super::{AppResult, OperationId, TaskError};

/// How the supervised body ended.
enum Ending<T> {
    Finished(AppResult<T>),
    Cancelled,
    TimedOut(Duration),
}

/// Spawns operations as supervised tasks.
pub struct TaskRunner<S> {
    ctx: SchedulingContext<S>,
    config: RunnerConfig,
}

impl<S: Clone> Clone for TaskRunner<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S> TaskRunner<S>
where
    S: Spawn + Clone + 'static,
{
    /// Create a runner with default configuration.
    pub fn new(ctx: SchedulingContext<S>) -> Self {
        Self::with_config(ctx, RunnerConfig::default())
    }

    /// Create a runner with explicit configuration.
    pub fn with_config(ctx: SchedulingContext<S>, config: RunnerConfig) -> Self {
        Self { ctx, config }
    }

    /// The scheduling context this runner spawns into.
    pub fn context(&self) -> &SchedulingContext<S> {
        &self.ctx
    }

    /// Runner configuration.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Schedule an operation. Returns immediately with a pending handle.
    ///
    /// # Errors
    ///
    /// - [`TaskError::AlreadyAttached`] if an operation with the same identity
    ///   is still owned by a runner or step controller.
    /// - [`TaskError::TimerUnavailable`] if a default timeout is configured and
    ///   the caller is not inside a Tokio runtime.
    pub fn spawn<T: 'static>(&self, operation: Operation<T>) -> Result<TaskHandle<T>, TaskError> {
        self.spawn_inner(operation, self.config.default_timeout())
    }

    /// Build an operation with `factory` and schedule it.
    ///
    /// # Errors
    ///
    /// Same as [`TaskRunner::spawn`].
    pub fn spawn_from<T, F>(&self, factory: F) -> Result<TaskHandle<T>, TaskError>
    where
        T: 'static,
        F: FnOnce() -> Operation<T>,
    {
        self.spawn(factory())
    }

    /// Schedule an operation that fails with [`TaskError::TimedOut`] if it has
    /// not completed within `timeout`. Requires a Tokio timer driver.
    ///
    /// # Errors
    ///
    /// Same as [`TaskRunner::spawn`].
    pub fn spawn_with_timeout<T: 'static>(
        &self,
        operation: Operation<T>,
        timeout: Duration,
    ) -> Result<TaskHandle<T>, TaskError> {
        self.spawn_inner(operation, Some(timeout))
    }

    /// Request cooperative cancellation of a task. Honored at the task's next
    /// suspension point; its finalizer then runs and the outcome becomes
    /// [`Outcome::Cancelled`]. Returns `false` if the task already settled or
    /// cancellation was already requested.
    pub fn cancel<T: 'static>(&self, handle: &TaskHandle<T>) -> bool {
        let requested = handle.cancel();
        if requested {
            tracing::info!(operation = %handle.id(), run_id = %handle.run_id(), "task cancel requested");
            self.ctx.record(handle.id(), handle.run_id(), "cancel", None);
        }
        requested
    }

    fn spawn_inner<T: 'static>(
        &self,
        operation: Operation<T>,
        timeout: Option<Duration>,
    ) -> Result<TaskHandle<T>, TaskError> {
        if timeout.is_some() && tokio::runtime::Handle::try_current().is_err() {
            tracing::error!(
                operation = %operation.id,
                ?timeout,
                "timeout requested outside a Tokio runtime"
            );
            return Err(TaskError::TimerUnavailable(operation.id));
        }
        self.ctx.attach(&operation.id)?;

        let Operation {
            id,
            run_id,
            body,
            finalizer,
            ..
        } = operation;
        let handle = TaskHandle::new(id.clone(), run_id, self.ctx.schedule_fn());

        tracing::info!(operation = %id, %run_id, ?timeout, "task spawned");
        self.ctx.record(&id, run_id, "spawn", None);

        let deadline = timeout.map(|limit| (limit, Box::pin(tokio::time::sleep(limit))));
        let supervised = handle.clone();
        let ctx = self.ctx.clone();
        let config = self.config.clone();
        self.ctx.spawn(async move {
            let ending = supervise(body, &supervised, deadline).await;
            let finalized = run_finalizer(&id, run_id, finalizer).await;
            ctx.record(&id, run_id, "finalize", (!finalized).then(|| "failed".to_string()));
            ctx.detach(&id);

            let outcome = settle_outcome(&id, run_id, ending, config.capture_trace);
            if let Outcome::Failed(failure) = &outcome {
                if config.warn_unobserved && !supervised.is_observed() {
                    tracing::warn!(
                        operation = %id,
                        %run_id,
                        error = %failure.message,
                        "task failed with no observer attached"
                    );
                }
            }
            ctx.record(&id, run_id, "settle", Some(outcome.label().to_string()));
            supervised.settle(outcome);
        });

        Ok(handle)
    }
}

/// Drive the body until it completes, is cancelled, or runs out of time.
async fn supervise<T: 'static>(
    mut body: OperationBody<T>,
    handle: &TaskHandle<T>,
    mut deadline: Option<(Duration, Pin<Box<tokio::time::Sleep>>)>,
) -> Ending<T> {
    poll_fn(move |cx| {
        if handle.poll_cancel(cx) {
            return Poll::Ready(Ending::Cancelled);
        }
        if let Poll::Ready(result) = body.as_mut().poll(cx) {
            return Poll::Ready(Ending::Finished(result));
        }
        if let Some((limit, sleep)) = deadline.as_mut() {
            if sleep.as_mut().poll(cx).is_ready() {
                return Poll::Ready(Ending::TimedOut(*limit));
            }
        }
        Poll::Pending
    })
    .await
}

fn settle_outcome<T>(
    id: &OperationId,
    run_id: Uuid,
    ending: Ending<T>,
    capture_trace: bool,
) -> Outcome<T> {
    match ending {
        Ending::Finished(Ok(value)) => {
            tracing::info!(operation = %id, %run_id, "task completed");
            Outcome::Value(value)
        }
        Ending::Finished(Err(err)) => {
            let failure = TaskFailure::from_error(id.clone(), &err, capture_trace);
            tracing::error!(
                operation = %id,
                %run_id,
                error = %failure.message,
                trace = %failure.trace,
                "task failed"
            );
            Outcome::Failed(failure)
        }
        Ending::Cancelled => {
            tracing::warn!(operation = %id, %run_id, "task cancelled");
            Outcome::Cancelled
        }
        Ending::TimedOut(limit) => {
            let err = anyhow::Error::new(TaskError::TimedOut {
                operation: id.clone(),
                timeout: limit,
            });
            let failure = TaskFailure::from_error(id.clone(), &err, capture_trace);
            tracing::error!(operation = %id, %run_id, error = %failure.message, "task timed out");
            Outcome::Failed(failure)
        }
    }
}
