//! Task handles: the observable, eventually-settled result of a supervised
//! operation.
//!
//! A [`TaskHandle`] is cheap to clone; every clone refers to the same task.
//! Settlement happens exactly once, on the scheduler's thread. Completion
//! callbacks run exactly once each and in registration order: callbacks present
//! at settlement run inline, callbacks registered afterwards are queued and
//! drained by a job on the next scheduling opportunity.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::task::{Context, Waker};

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Notify;
use uuid::Uuid;

use super::{OperationId, TaskError};

/// Failure captured from an operation, with its rendered error chain and a
/// debug trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    /// Operation that failed.
    pub operation: OperationId,
    /// Human-readable error chain, suitable for a status cell.
    pub message: String,
    /// Debug rendering of the error (includes a backtrace when
    /// `RUST_BACKTRACE` enables capture). Empty when trace capture is off.
    pub trace: String,
}

impl TaskFailure {
    /// Capture a failure from an error.
    pub fn from_error(operation: OperationId, err: &anyhow::Error, capture_trace: bool) -> Self {
        Self {
            operation,
            message: format!("{err:#}"),
            trace: if capture_trace {
                format!("{err:?}")
            } else {
                String::new()
            },
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.message)
    }
}

/// Outcome of a supervised task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// Still running or waiting to be scheduled.
    Pending,
    /// Completed with a value.
    Value(T),
    /// Completed with a failure.
    Failed(TaskFailure),
    /// Cancelled before completion.
    Cancelled,
}

impl<T> Outcome<T> {
    /// Whether the task has not settled yet.
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Whether the task has settled, whatever the result.
    pub const fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// Whether the task completed with a value.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Captured failure, if the task failed.
    pub const fn failure(&self) -> Option<&TaskFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Completed value, if any.
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Short lowercase label for logs and snapshots.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Value(_) => "done",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Callback invoked once a task settles.
pub type SettleCallback<T> = Box<dyn FnOnce(&Outcome<T>)>;

/// Schedules a unit of work on the owning scheduler.
pub(crate) type Schedule = Rc<dyn Fn(LocalBoxFuture<'static, ()>)>;

struct HandleState<T> {
    outcome: Rc<Outcome<T>>,
    callbacks: Vec<SettleCallback<T>>,
    late: VecDeque<SettleCallback<T>>,
    draining: bool,
    cancel_requested: bool,
    cancel_waker: Option<Waker>,
    observed: bool,
}

struct HandleInner<T> {
    id: OperationId,
    run_id: Uuid,
    state: RefCell<HandleState<T>>,
    settled: Notify,
    schedule: Schedule,
}

/// Observable handle of a supervised task.
pub struct TaskHandle<T> {
    inner: Rc<HandleInner<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("TaskHandle")
            .field("id", &self.inner.id)
            .field("run_id", &self.inner.run_id)
            .field("outcome", &state.outcome.label())
            .field("cancel_requested", &state.cancel_requested)
            .finish()
    }
}

impl<T: 'static> TaskHandle<T> {
    pub(crate) fn new(id: OperationId, run_id: Uuid, schedule: Schedule) -> Self {
        Self {
            inner: Rc::new(HandleInner {
                id,
                run_id,
                state: RefCell::new(HandleState {
                    outcome: Rc::new(Outcome::Pending),
                    callbacks: Vec::new(),
                    late: VecDeque::new(),
                    draining: false,
                    cancel_requested: false,
                    cancel_waker: None,
                    observed: false,
                }),
                settled: Notify::new(),
                schedule,
            }),
        }
    }

    /// Identity of the supervised operation.
    pub fn id(&self) -> &OperationId {
        &self.inner.id
    }

    /// Identity of this invocation.
    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    /// Current outcome. Marks the handle as observed.
    pub fn outcome(&self) -> Rc<Outcome<T>> {
        let mut state = self.inner.state.borrow_mut();
        state.observed = true;
        Rc::clone(&state.outcome)
    }

    /// Whether the task has settled.
    pub fn is_settled(&self) -> bool {
        self.inner.state.borrow().outcome.is_settled()
    }

    /// Whether cancellation has been requested.
    pub fn is_cancel_requested(&self) -> bool {
        self.inner.state.borrow().cancel_requested
    }

    /// Whether anything has looked at this task's outcome.
    pub fn is_observed(&self) -> bool {
        self.inner.state.borrow().observed
    }

    /// Register a callback that runs exactly once when the task settles.
    ///
    /// Callbacks run in registration order. A callback registered after
    /// settlement runs on the next scheduling opportunity, never inline.
    pub fn on_settled<F>(&self, callback: F)
    where
        F: FnOnce(&Outcome<T>) + 'static,
    {
        let mut state = self.inner.state.borrow_mut();
        state.observed = true;
        if state.outcome.is_pending() {
            state.callbacks.push(Box::new(callback));
            return;
        }
        state.late.push_back(Box::new(callback));
        if state.draining {
            return;
        }
        state.draining = true;
        drop(state);

        let handle = self.clone();
        (self.inner.schedule)(async move { handle.drain_late() }.boxed_local());
    }

    /// Wait until the task settles and return its outcome. Marks the handle as
    /// observed.
    pub async fn settled(&self) -> Rc<Outcome<T>> {
        self.inner.state.borrow_mut().observed = true;
        loop {
            let notified = self.inner.settled.notified();
            {
                let state = self.inner.state.borrow();
                if state.outcome.is_settled() {
                    return Rc::clone(&state.outcome);
                }
            }
            notified.await;
        }
    }

    /// Request cooperative cancellation. Returns `true` if this call recorded
    /// the request; `false` if it was already requested or the task settled.
    pub fn cancel(&self) -> bool {
        let waker = {
            let mut state = self.inner.state.borrow_mut();
            if state.cancel_requested || state.outcome.is_settled() {
                return false;
            }
            state.cancel_requested = true;
            state.cancel_waker.take()
        };
        tracing::debug!(operation = %self.inner.id, run_id = %self.inner.run_id, "cancellation requested");
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    /// Register the supervising task's waker and report whether cancellation
    /// has been requested.
    pub(crate) fn poll_cancel(&self, cx: &Context<'_>) -> bool {
        let mut state = self.inner.state.borrow_mut();
        if state.cancel_requested {
            return true;
        }
        state.cancel_waker = Some(cx.waker().clone());
        false
    }

    /// Settle the handle. Only the supervising runner calls this, once.
    pub(crate) fn settle(&self, outcome: Outcome<T>) {
        let (outcome, callbacks) = {
            let mut state = self.inner.state.borrow_mut();
            debug_assert!(state.outcome.is_pending(), "task handle settled twice");
            state.outcome = Rc::new(outcome);
            state.cancel_waker = None;
            (Rc::clone(&state.outcome), std::mem::take(&mut state.callbacks))
        };
        for callback in callbacks {
            callback(&outcome);
        }
        self.inner.settled.notify_waiters();
    }

    fn drain_late(&self) {
        loop {
            let next = {
                let mut state = self.inner.state.borrow_mut();
                match state.late.pop_front() {
                    Some(callback) => Some((callback, Rc::clone(&state.outcome))),
                    None => {
                        state.draining = false;
                        None
                    }
                }
            };
            let Some((callback, outcome)) = next else {
                break;
            };
            callback(&outcome);
        }
    }
}

impl<T: Clone + 'static> TaskHandle<T> {
    /// Completed value, if the task succeeded. Marks the handle as observed.
    pub fn value(&self) -> Option<T> {
        self.outcome().value().cloned()
    }

    /// Wait until the task settles and convert the outcome into a `Result`.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Operation`] carrying the failure's error chain.
    /// - [`TaskError::Cancelled`] when the task was cancelled.
    pub async fn join(&self) -> Result<T, TaskError> {
        match &*self.settled().await {
            Outcome::Value(value) => Ok(value.clone()),
            Outcome::Failed(failure) => Err(TaskError::Operation {
                operation: failure.operation.clone(),
                message: failure.message.clone(),
            }),
            // `settled()` never yields `Pending`.
            Outcome::Pending | Outcome::Cancelled => Err(TaskError::Cancelled(self.id().clone())),
        }
    }
}
