//! Suspendable operations: the unit of work consumed by the runner, the step
//! controller and the batch coordinator.
//!
//! An [`Operation`] wraps a local (non-`Send`) future together with an identity
//! and an optional asynchronous finalizer. Bodies built with
//! [`Operation::with_breakpoints`] receive a [`Breakpoint`]; awaiting
//! [`Breakpoint::reached`] marks an explicit suspension point:
//!
//! - under a [`TaskRunner`](crate::core::TaskRunner) it is a plain yield back to
//!   the scheduler;
//! - under a [`StepController`](crate::core::StepController) it ends the current
//!   step, and the body stays parked there until the next `step()`.
//!
//! The completion of the body counts as its final suspension point, so a body
//! with two breakpoints is driven to the end by three steps.
//!
//! ```rust,ignore
//! let sweep = Operation::with_breakpoints("bias-sweep", move |bp| async move {
//!     for volts in [0.0, 0.5, 1.0] {
//!         source.update("voltage", volts).await?;
//!         bp.reached().await;
//!     }
//!     Ok(())
//! })
//! .with_finalizer(move || async move { source.update("voltage", 0.0).await });
//! ```

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{AppResult, TaskError};

/// Identity of an operation, used for logging, correlation and to detect an
/// operation being attached twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    /// Create an identity from any string-like key (device name, script name).
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the identity as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for OperationId {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Boxed operation body.
pub type OperationBody<T> = LocalBoxFuture<'static, AppResult<T>>;

/// Cleanup run exactly once when an operation ends, however it ends.
pub type Finalizer = Box<dyn FnOnce() -> LocalBoxFuture<'static, AppResult<()>>>;

#[derive(Debug, Default)]
struct Gate {
    hit: Cell<bool>,
    reached: Cell<usize>,
}

/// Handle given to an operation body to mark explicit suspension points.
#[derive(Debug, Clone, Default)]
pub struct Breakpoint {
    gate: Rc<Gate>,
}

impl Breakpoint {
    /// Suspend at a predefined breakpoint.
    pub fn reached(&self) -> BreakpointReached {
        BreakpointReached {
            gate: Rc::clone(&self.gate),
            yielded: false,
        }
    }

    /// Number of breakpoints the body has reached so far.
    pub fn count(&self) -> usize {
        self.gate.reached.get()
    }

    /// Consume the "breakpoint just reached" flag.
    pub(crate) fn take_hit(&self) -> bool {
        self.gate.hit.replace(false)
    }
}

/// Future returned by [`Breakpoint::reached`].
///
/// Pending exactly once. The waker is signalled immediately so a scheduler that
/// knows nothing about breakpoints simply resumes the body on its next turn.
#[derive(Debug)]
#[must_use = "breakpoints do nothing unless awaited"]
pub struct BreakpointReached {
    gate: Rc<Gate>,
    yielded: bool,
}

impl Future for BreakpointReached {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        self.gate.hit.set(true);
        self.gate.reached.set(self.gate.reached.get() + 1);
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// A resumable procedure with identity and a guaranteed finalizer.
///
/// Created per invocation and consumed by whoever drives it; it is never reused
/// across runs.
pub struct Operation<T> {
    pub(crate) id: OperationId,
    pub(crate) run_id: Uuid,
    pub(crate) body: OperationBody<T>,
    pub(crate) breakpoint: Breakpoint,
    pub(crate) finalizer: Option<Finalizer>,
}

impl<T: 'static> Operation<T> {
    /// Build an operation from a future with no explicit breakpoints.
    pub fn new<F>(id: impl Into<OperationId>, body: F) -> Self
    where
        F: Future<Output = AppResult<T>> + 'static,
    {
        Self::with_breakpoints(id, move |_| body)
    }

    /// Build an operation whose body receives a [`Breakpoint`].
    pub fn with_breakpoints<B, F>(id: impl Into<OperationId>, build: B) -> Self
    where
        B: FnOnce(Breakpoint) -> F,
        F: Future<Output = AppResult<T>> + 'static,
    {
        let id = id.into();
        let breakpoint = Breakpoint::default();
        let body = build(breakpoint.clone());
        let panic_id = id.clone();
        let guarded = async move {
            match AssertUnwindSafe(body).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(anyhow::anyhow!(
                    "operation `{panic_id}` panicked: {}",
                    panic_message(&*payload)
                )),
            }
        };
        Self {
            id,
            run_id: Uuid::new_v4(),
            body: guarded.boxed_local(),
            breakpoint,
            finalizer: None,
        }
    }

    /// Attach cleanup that runs exactly once when the operation completes,
    /// fails or is cancelled. Replaces any previous finalizer.
    #[must_use]
    pub fn with_finalizer<C, Fut>(mut self, cleanup: C) -> Self
    where
        C: FnOnce() -> Fut + 'static,
        Fut: Future<Output = AppResult<()>> + 'static,
    {
        self.finalizer = Some(Box::new(move || cleanup().boxed_local()));
        self
    }

    /// Operation identity.
    pub fn id(&self) -> &OperationId {
        &self.id
    }

    /// Identity of this particular invocation.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Whether a finalizer is attached.
    pub fn has_finalizer(&self) -> bool {
        self.finalizer.is_some()
    }
}

impl<T> fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("run_id", &self.run_id)
            .field("finalizer", &self.finalizer.is_some())
            .finish_non_exhaustive()
    }
}

/// Run a finalizer, logging and swallowing any failure or panic.
///
/// Returns `true` when there was nothing to run or the cleanup succeeded.
pub(crate) async fn run_finalizer(
    id: &OperationId,
    run_id: Uuid,
    finalizer: Option<Finalizer>,
) -> bool {
    let Some(finalizer) = finalizer else {
        return true;
    };
    tracing::debug!(operation = %id, %run_id, "running finalizer");
    let cleanup = async move { finalizer().await };
    match AssertUnwindSafe(cleanup).catch_unwind().await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            let err = TaskError::Finalizer {
                operation: id.clone(),
                message: format!("{err:#}"),
            };
            tracing::error!(operation = %id, %run_id, error = %err, "finalizer failed");
            false
        }
        Err(payload) => {
            tracing::error!(
                operation = %id,
                %run_id,
                panic = %panic_message(&*payload),
                "finalizer panicked"
            );
            false
        }
    }
}

/// Best-effort rendering of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
