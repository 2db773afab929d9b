//! The injected scheduling context.
//!
//! Components never reach for a global event loop. They are handed a
//! [`SchedulingContext`] holding a [`Spawn`] implementation (the cooperative
//! scheduler), the registry of operations currently attached to a runner or
//! step controller, and an optional audit sink.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use uuid::Uuid;

use super::audit::{build_audit_event, SharedAuditSink};
use super::handle::Schedule;
use super::{OperationId, TaskError};

/// Abstraction for scheduling a unit of work on the cooperative scheduler.
///
/// Futures are not required to be `Send`: everything runs on one logical
/// thread and only interleaves at suspension points.
pub trait Spawn {
    /// Schedule a future to start at the next scheduling opportunity.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + 'static;
}

/// Scheduler plus the bookkeeping shared by every component built on it.
pub struct SchedulingContext<S> {
    spawner: S,
    attached: Rc<RefCell<HashSet<OperationId>>>,
    audit: Option<SharedAuditSink>,
}

impl<S: Clone> Clone for SchedulingContext<S> {
    fn clone(&self) -> Self {
        Self {
            spawner: self.spawner.clone(),
            attached: Rc::clone(&self.attached),
            audit: self.audit.clone(),
        }
    }
}

impl<S> fmt::Debug for SchedulingContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulingContext")
            .field("attached", &self.attached.borrow().len())
            .field("audit", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}

impl<S> SchedulingContext<S>
where
    S: Spawn + Clone + 'static,
{
    /// Create a context around a scheduler.
    pub fn new(spawner: S) -> Self {
        Self {
            spawner,
            attached: Rc::new(RefCell::new(HashSet::new())),
            audit: None,
        }
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: SharedAuditSink) -> Self {
        self.audit = Some(audit);
        self
    }

    /// The scheduler.
    pub fn spawner(&self) -> &S {
        &self.spawner
    }

    /// Schedule a unit of work.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + 'static,
    {
        self.spawner.spawn(fut);
    }

    /// Whether an operation with this identity is currently attached.
    pub fn is_attached(&self, id: &OperationId) -> bool {
        self.attached.borrow().contains(id)
    }

    /// Number of attached operations.
    pub fn attached_count(&self) -> usize {
        self.attached.borrow().len()
    }

    /// Claim exclusive ownership of an operation identity.
    pub(crate) fn attach(&self, id: &OperationId) -> Result<(), TaskError> {
        if !self.attached.borrow_mut().insert(id.clone()) {
            tracing::error!(operation = %id, "operation is already attached");
            return Err(TaskError::AlreadyAttached(id.clone()));
        }
        Ok(())
    }

    /// Release an identity once the operation's finalizer has run.
    pub(crate) fn detach(&self, id: &OperationId) {
        self.attached.borrow_mut().remove(id);
    }

    /// Record an audit event if a sink is attached.
    pub(crate) fn record(
        &self,
        operation: &OperationId,
        run_id: Uuid,
        action: &str,
        detail: Option<String>,
    ) {
        if let Some(audit) = &self.audit {
            audit
                .lock()
                .record(build_audit_event(operation, run_id, action, detail));
        }
    }

    /// Type-erased scheduling function handed to task handles.
    pub(crate) fn schedule_fn(&self) -> Schedule {
        let spawner = self.spawner.clone();
        Rc::new(move |fut: LocalBoxFuture<'static, ()>| spawner.spawn(fut))
    }
}
