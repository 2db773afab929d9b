//! Manual step control of a single operation.
//!
//! A [`StepController`] owns one [`Operation`] for its whole lifetime and drives
//! it one suspension point at a time:
//!
//! ```text
//!            run()                      step() / auto-advance
//!   PAUSED ─────────▶ RUNNING ─────────────────────────────┐
//!     ▲  ◀──────────     │                                 │
//!     │    pause()       │ cancel() / completion / failure │
//!     │                  ▼                                 │
//!     └── cancel() ──▶ FINISHED ◀──────────────────────────┘
//! ```
//!
//! `FINISHED` is terminal. It is entered exactly once and the operation's
//! finalizer runs exactly once when it is.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::poll_fn;
use std::rc::Rc;
use std::task::{Poll, Waker};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::signal::Signal;

use super::handle::TaskFailure;
use super::operation::{run_finalizer, Breakpoint, Finalizer, Operation, OperationBody};
use super::scheduler::{SchedulingContext, Spawn};
use super::{OperationId, StepError, TaskError};

/// State of a step controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// Waiting for `run()` or `step()`. Initial state.
    Paused,
    /// Advancing automatically.
    Running,
    /// Completed, failed or cancelled. Terminal.
    Finished,
}

impl StepStatus {
    /// Upper-case label used by status displays.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paused => "PAUSED",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which controls are actionable in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlState {
    /// `run()` is meaningful.
    pub run: bool,
    /// `pause()` is meaningful.
    pub pause: bool,
    /// `step()` is meaningful.
    pub step: bool,
    /// `cancel()` is meaningful.
    pub cancel: bool,
}

impl ControlState {
    /// Enabled controls for `status`.
    pub const fn for_status(status: StepStatus) -> Self {
        Self {
            run: matches!(status, StepStatus::Paused),
            pause: matches!(status, StepStatus::Running),
            step: matches!(status, StepStatus::Paused),
            cancel: !matches!(status, StepStatus::Finished),
        }
    }
}

enum Progress<T> {
    Suspended,
    Completed(T),
    Failed(anyhow::Error),
    Cancelled,
}

struct StepInner<S: Spawn + Clone + 'static, T: 'static> {
    ctx: SchedulingContext<S>,
    id: OperationId,
    run_id: Uuid,
    status: Cell<StepStatus>,
    body: RefCell<Option<OperationBody<T>>>,
    breakpoint: Breakpoint,
    finalizer: RefCell<Option<Finalizer>>,
    stepping: Cell<bool>,
    advance_scheduled: Cell<bool>,
    step_waker: RefCell<Option<Waker>>,
    steps_taken: Cell<usize>,
    value: RefCell<Option<T>>,
    failure: RefCell<Option<TaskFailure>>,
    status_changed: Signal<StepStatus>,
    stepped: Signal<usize>,
    finished: Signal<bool>,
}

/// Marks a step as in flight. Dropping it, including when the `step()`
/// future itself is dropped mid-step, leaves the controller steppable again.
struct StepGuard<'a, S: Spawn + Clone + 'static, T: 'static> {
    inner: &'a StepInner<S, T>,
}

impl<'a, S: Spawn + Clone + 'static, T: 'static> StepGuard<'a, S, T> {
    fn enter(inner: &'a StepInner<S, T>) -> Self {
        inner.stepping.set(true);
        Self { inner }
    }
}

impl<S: Spawn + Clone + 'static, T: 'static> Drop for StepGuard<'_, S, T> {
    fn drop(&mut self) {
        self.inner.stepping.set(false);
        self.inner.step_waker.borrow_mut().take();
    }
}

impl<S: Spawn + Clone + 'static, T: 'static> Drop for StepInner<S, T> {
    fn drop(&mut self) {
        if self.status.get() == StepStatus::Finished {
            return;
        }
        tracing::warn!(
            operation = %self.id,
            run_id = %self.run_id,
            status = %self.status.get(),
            "step controller dropped before finishing"
        );
        drop(self.body.get_mut().take());
        let finalizer = self.finalizer.get_mut().take();
        let ctx = self.ctx.clone();
        let id = self.id.clone();
        let run_id = self.run_id;
        self.ctx.spawn(async move {
            run_finalizer(&id, run_id, finalizer).await;
            ctx.detach(&id);
        });
    }
}

/// Drives one operation under manual run/pause/step/cancel control.
///
/// Cloning yields another handle to the same controller.
pub struct StepController<S: Spawn + Clone + 'static, T: 'static> {
    inner: Rc<StepInner<S, T>>,
}

impl<S: Spawn + Clone + 'static, T: 'static> Clone for StepController<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: Spawn + Clone + 'static, T: 'static> fmt::Debug for StepController<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepController")
            .field("id", &self.inner.id)
            .field("status", &self.inner.status.get())
            .field("steps_taken", &self.inner.steps_taken.get())
            .finish_non_exhaustive()
    }
}

impl<S: Spawn + Clone + 'static, T: 'static> StepController<S, T> {
    /// Adopt an operation. Starts `PAUSED`.
    ///
    /// # Errors
    ///
    /// [`TaskError::AlreadyAttached`] if the operation's identity is already
    /// owned by a runner or another controller.
    pub fn new(ctx: SchedulingContext<S>, operation: Operation<T>) -> Result<Self, TaskError> {
        ctx.attach(&operation.id)?;
        let Operation {
            id,
            run_id,
            body,
            breakpoint,
            finalizer,
        } = operation;
        tracing::debug!(operation = %id, %run_id, "step controller created");
        ctx.record(&id, run_id, "status", Some(StepStatus::Paused.to_string()));

        Ok(Self {
            inner: Rc::new(StepInner {
                ctx,
                id,
                run_id,
                status: Cell::new(StepStatus::Paused),
                body: RefCell::new(Some(body)),
                breakpoint,
                finalizer: RefCell::new(finalizer),
                stepping: Cell::new(false),
                advance_scheduled: Cell::new(false),
                step_waker: RefCell::new(None),
                steps_taken: Cell::new(0),
                value: RefCell::new(None),
                failure: RefCell::new(None),
                status_changed: Signal::new(),
                stepped: Signal::new(),
                finished: Signal::new(),
            }),
        })
    }

    /// Identity of the controlled operation.
    pub fn id(&self) -> &OperationId {
        &self.inner.id
    }

    /// Identity of this invocation.
    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    /// Current state.
    pub fn status(&self) -> StepStatus {
        self.inner.status.get()
    }

    /// Controls actionable in the current state.
    pub fn controls(&self) -> ControlState {
        ControlState::for_status(self.status())
    }

    /// Number of steps executed so far.
    pub fn steps_taken(&self) -> usize {
        self.inner.steps_taken.get()
    }

    /// Whether a step is currently executing.
    pub fn is_stepping(&self) -> bool {
        self.inner.stepping.get()
    }

    /// Value produced by the operation, once it completed. Taken at most once.
    pub fn take_value(&self) -> Option<T> {
        self.inner.value.borrow_mut().take()
    }

    /// Failure that finished the operation, if any.
    pub fn failure(&self) -> Option<TaskFailure> {
        self.inner.failure.borrow().clone()
    }

    /// Listen for state transitions. Receives the new state.
    pub fn on_status_changed<F>(&self, listener: F)
    where
        F: Fn(&StepStatus) + 'static,
    {
        self.inner.status_changed.connect(listener);
    }

    /// Listen for executed steps. Receives the number of steps taken so far.
    pub fn on_stepped<F>(&self, listener: F)
    where
        F: Fn(&usize) + 'static,
    {
        self.inner.stepped.connect(listener);
    }

    /// Listen for the end of the operation. Receives `true` when it completed
    /// successfully, `false` when it failed or was cancelled.
    pub fn on_finished<F>(&self, listener: F)
    where
        F: Fn(&bool) + 'static,
    {
        self.inner.finished.connect(listener);
    }

    /// `PAUSED`/`RUNNING` → `RUNNING`, and schedule an attempt to advance.
    /// Ignored once `FINISHED`.
    pub fn run(&self) {
        match self.status() {
            StepStatus::Finished => {
                tracing::debug!(operation = %self.inner.id, "run ignored, task finished");
                return;
            }
            StepStatus::Paused => self.set_status(StepStatus::Running),
            StepStatus::Running => {}
        }
        self.schedule_advance();
    }

    /// `RUNNING` → `PAUSED`. Takes effect before the next step begins; a step
    /// already executing completes first. Ignored in any other state.
    pub fn pause(&self) {
        if self.status() == StepStatus::Running {
            self.set_status(StepStatus::Paused);
        } else {
            tracing::debug!(operation = %self.inner.id, status = %self.status(), "pause ignored");
        }
    }

    /// Advance past exactly one suspension point.
    ///
    /// Resolves once the step has executed, with the resulting state. The
    /// completion of the operation is its last suspension point: the step that
    /// completes it returns [`StepStatus::Finished`] after the finalizer ran.
    ///
    /// # Errors
    ///
    /// - [`StepError::AlreadyFinished`] when called in `FINISHED`.
    /// - [`StepError::StepInProgress`] when another step is executing.
    /// - [`StepError::OperationFailed`] when the operation failed during this
    ///   step. The controller is then `FINISHED`.
    pub async fn step(&self) -> Result<StepStatus, StepError> {
        let inner = &*self.inner;
        if inner.status.get() == StepStatus::Finished {
            return Err(StepError::AlreadyFinished);
        }
        if inner.stepping.get() {
            return Err(StepError::StepInProgress);
        }
        if inner.body.borrow().is_none() {
            return Err(StepError::AlreadyFinished);
        }
        let guard = StepGuard::enter(inner);
        tracing::debug!(
            operation = %inner.id,
            step = inner.steps_taken.get() + 1,
            status = %inner.status.get(),
            "step started"
        );

        // The body stays in the controller between polls: a dropped `step()`
        // leaves it resumable and `cancel()` can drop it before finalizing.
        let progress = poll_fn(|cx| {
            if inner.status.get() == StepStatus::Finished {
                return Poll::Ready(Progress::Cancelled);
            }
            let mut slot = inner.body.borrow_mut();
            let Some(body) = slot.as_mut() else {
                return Poll::Ready(Progress::Cancelled);
            };
            let result = match body.as_mut().poll(cx) {
                Poll::Ready(result) => result,
                Poll::Pending if inner.breakpoint.take_hit() => {
                    return Poll::Ready(Progress::Suspended);
                }
                Poll::Pending => {
                    *inner.step_waker.borrow_mut() = Some(cx.waker().clone());
                    return Poll::Pending;
                }
            };
            drop(slot.take());
            Poll::Ready(match result {
                Ok(value) => Progress::Completed(value),
                Err(err) => Progress::Failed(err),
            })
        })
        .await;

        match progress {
            Progress::Suspended => {
                drop(guard);
                let taken = self.count_step();
                tracing::debug!(operation = %inner.id, step = taken, "step suspended at breakpoint");
                if inner.status.get() == StepStatus::Running {
                    self.schedule_advance();
                }
                Ok(inner.status.get())
            }
            Progress::Completed(value) => {
                *inner.value.borrow_mut() = Some(value);
                let taken = self.count_step();
                tracing::info!(operation = %inner.id, steps = taken, "operation completed");
                self.finish(true).await;
                Ok(StepStatus::Finished)
            }
            Progress::Failed(err) => {
                let failure = TaskFailure::from_error(inner.id.clone(), &err, true);
                tracing::error!(
                    operation = %inner.id,
                    run_id = %inner.run_id,
                    error = %failure.message,
                    trace = %failure.trace,
                    "step failed"
                );
                let message = failure.message.clone();
                *inner.failure.borrow_mut() = Some(failure);
                self.finish(false).await;
                Err(StepError::OperationFailed(message))
            }
            Progress::Cancelled => {
                drop(inner.body.borrow_mut().take());
                tracing::debug!(operation = %inner.id, "in-flight step abandoned");
                Ok(StepStatus::Finished)
            }
        }
    }

    /// Any non-`FINISHED` state → `FINISHED`: discard the remaining steps and
    /// run the finalizer. Returns `false` when already `FINISHED`.
    ///
    /// A step executing concurrently is abandoned at its current suspension
    /// point and resolves with [`StepStatus::Finished`].
    pub async fn cancel(&self) -> bool {
        if self.status() == StepStatus::Finished {
            return false;
        }
        tracing::warn!(operation = %self.inner.id, run_id = %self.inner.run_id, "task cancelled");
        self.inner
            .ctx
            .record(&self.inner.id, self.inner.run_id, "cancel", None);
        // Still borrowed only when the body itself awaits `cancel()`; the
        // in-flight step then drops it on its next poll.
        if let Ok(mut slot) = self.inner.body.try_borrow_mut() {
            drop(slot.take());
        }
        self.finish(false).await;
        true
    }

    /// Schedule one `step()` as its own unit of work, for callers that cannot
    /// await (e.g. a button handler). Errors are logged.
    pub fn schedule_step(&self) {
        let ctl = self.clone();
        self.inner.ctx.spawn(async move {
            if let Err(err) = ctl.step().await {
                tracing::debug!(operation = %ctl.inner.id, error = %err, "scheduled step rejected");
            }
        });
    }

    /// Schedule `cancel()` as its own unit of work.
    pub fn schedule_cancel(&self) {
        let ctl = self.clone();
        self.inner.ctx.spawn(async move {
            ctl.cancel().await;
        });
    }

    fn schedule_advance(&self) {
        if self.inner.advance_scheduled.replace(true) {
            return;
        }
        let ctl = self.clone();
        self.inner.ctx.spawn(async move {
            ctl.inner.advance_scheduled.set(false);
            if ctl.status() != StepStatus::Running || ctl.is_stepping() {
                return;
            }
            if let Err(err) = ctl.step().await {
                tracing::debug!(operation = %ctl.inner.id, error = %err, "advance stopped");
            }
        });
    }

    fn count_step(&self) -> usize {
        let taken = self.inner.steps_taken.get() + 1;
        self.inner.steps_taken.set(taken);
        self.inner.stepped.emit(&taken);
        taken
    }

    fn set_status(&self, status: StepStatus) {
        let previous = self.inner.status.replace(status);
        if previous == status {
            return;
        }
        tracing::debug!(operation = %self.inner.id, from = %previous, to = %status, "status changed");
        self.inner
            .ctx
            .record(&self.inner.id, self.inner.run_id, "status", Some(status.to_string()));
        self.inner.status_changed.emit(&status);
    }

    /// Enter `FINISHED`, run the finalizer, release the identity and announce
    /// the result.
    async fn finish(&self, success: bool) {
        let inner = &self.inner;
        self.set_status(StepStatus::Finished);
        if let Some(waker) = inner.step_waker.borrow_mut().take() {
            waker.wake();
        }
        let finalizer = inner.finalizer.borrow_mut().take();
        let finalized = run_finalizer(&inner.id, inner.run_id, finalizer).await;
        inner.ctx.record(
            &inner.id,
            inner.run_id,
            "finalize",
            (!finalized).then(|| "failed".to_string()),
        );
        inner.ctx.detach(&inner.id);
        inner.finished.emit(&success);
        // No further emissions once finished; release listeners so closures
        // holding a controller clone do not keep it alive.
        inner.status_changed.disconnect_all();
        inner.stepped.disconnect_all();
        inner.finished.disconnect_all();
    }
}
