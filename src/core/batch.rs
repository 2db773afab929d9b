//! Batch coordination: launch several independent operations at once and
//! report a verdict only after every one of them settled.
//!
//! Items never affect each other. A failing item is recorded with its failure
//! text while its siblings keep running; the verdict is computed once the last
//! item leaves `Pending`.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Serialize;
use tokio::sync::Notify;

use crate::config::BatchConfig;
use crate::util::signal::Signal;

use super::handle::{Outcome, TaskHandle};
use super::instrument::Instrument;
use super::operation::Operation;
use super::runner::TaskRunner;
use super::scheduler::Spawn;
use super::{OperationId, TaskError};

/// One unit of a batch: an operation plus the label shown next to it.
pub struct BatchItem<T> {
    /// Secondary column shown by displays, e.g. the instrument class.
    pub label: String,
    /// The work to run. Its identity is the item identity.
    pub operation: Operation<T>,
}

impl<T: 'static> BatchItem<T> {
    /// Create an item.
    pub fn new(label: impl Into<String>, operation: Operation<T>) -> Self {
        Self {
            label: label.into(),
            operation,
        }
    }

    /// Item identity.
    pub fn id(&self) -> &OperationId {
        self.operation.id()
    }
}

impl<T> fmt::Debug for BatchItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchItem")
            .field("label", &self.label)
            .field("operation", &self.operation)
            .finish()
    }
}

/// Settlement state of one batch entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ItemStatus {
    /// Still running.
    Pending,
    /// Completed successfully.
    Done,
    /// Failed with the given description.
    Failed(String),
    /// Cancelled before completion.
    Cancelled,
}

impl ItemStatus {
    /// Whether the entry has settled.
    pub const fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Display row for one batch entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchRow {
    /// Item identity.
    pub item_id: OperationId,
    /// Item label.
    pub label: String,
    /// Settlement state.
    pub status: ItemStatus,
    /// Status text shown to the operator.
    pub text: String,
}

/// Status-text change of one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemUpdate {
    /// Item identity.
    pub item_id: OperationId,
    /// New status text.
    pub text: String,
}

/// Aggregate result of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchVerdict {
    /// `true` iff every entry completed successfully.
    pub success: bool,
    /// Final per-item record, in launch order.
    pub rows: Vec<BatchRow>,
}

impl BatchVerdict {
    /// Rows that did not complete successfully.
    pub fn failures(&self) -> impl Iterator<Item = &BatchRow> {
        self.rows.iter().filter(|row| row.status != ItemStatus::Done)
    }
}

struct Entry<T> {
    row: BatchRow,
    handle: TaskHandle<T>,
}

struct RecordInner<T> {
    entries: RefCell<Vec<Entry<T>>>,
    remaining: Cell<usize>,
    verdict: RefCell<Option<BatchVerdict>>,
    item_changed: Signal<ItemUpdate>,
    finished: Signal<bool>,
    done: Notify,
    config: BatchConfig,
}

impl<T: 'static> RecordInner<T> {
    fn settle_entry(&self, index: usize, outcome: &Outcome<T>) {
        let update = {
            let mut entries = self.entries.borrow_mut();
            let Some(entry) = entries.get_mut(index) else {
                return;
            };
            let (status, text) = match outcome {
                Outcome::Pending => return,
                Outcome::Value(_) => (ItemStatus::Done, self.config.success_text.clone()),
                Outcome::Failed(failure) => {
                    (ItemStatus::Failed(failure.message.clone()), failure.message.clone())
                }
                Outcome::Cancelled => (ItemStatus::Cancelled, self.config.cancelled_text.clone()),
            };
            entry.row.status = status;
            entry.row.text.clone_from(&text);
            ItemUpdate {
                item_id: entry.row.item_id.clone(),
                text,
            }
        };
        tracing::debug!(item = %update.item_id, text = %update.text, "batch item settled");
        self.item_changed.emit(&update);

        let remaining = self.remaining.get().saturating_sub(1);
        self.remaining.set(remaining);
        if remaining == 0 {
            self.conclude();
        }
    }

    fn conclude(&self) {
        let rows: Vec<BatchRow> = self
            .entries
            .borrow()
            .iter()
            .map(|entry| entry.row.clone())
            .collect();
        let success = rows.iter().all(|row| row.status == ItemStatus::Done);
        let failed = rows.iter().filter(|row| row.status != ItemStatus::Done).count();
        if success {
            tracing::info!(items = rows.len(), "batch completed");
        } else {
            tracing::warn!(items = rows.len(), failed, "batch completed with failures");
        }
        *self.verdict.borrow_mut() = Some(BatchVerdict { success, rows });
        self.finished.emit(&success);
        self.item_changed.disconnect_all();
        self.finished.disconnect_all();
        self.done.notify_waiters();
    }
}

/// Per-item record of a launched batch.
///
/// Cloning yields another view of the same batch.
pub struct BatchRecord<T> {
    inner: Rc<RecordInner<T>>,
}

impl<T> Clone for BatchRecord<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for BatchRecord<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchRecord")
            .field("items", &self.inner.entries.borrow().len())
            .field("remaining", &self.inner.remaining.get())
            .finish_non_exhaustive()
    }
}

impl<T: 'static> BatchRecord<T> {
    /// Number of items.
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    /// Whether the batch has no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of items that have not settled yet.
    pub fn remaining(&self) -> usize {
        self.inner.remaining.get()
    }

    /// Current per-item rows, in launch order.
    pub fn snapshot(&self) -> Vec<BatchRow> {
        self.inner
            .entries
            .borrow()
            .iter()
            .map(|entry| entry.row.clone())
            .collect()
    }

    /// Current state of one item.
    pub fn status(&self, item_id: &OperationId) -> Option<ItemStatus> {
        self.inner
            .entries
            .borrow()
            .iter()
            .find(|entry| &entry.row.item_id == item_id)
            .map(|entry| entry.row.status.clone())
    }

    /// Task handle of one item.
    pub fn handle(&self, item_id: &OperationId) -> Option<TaskHandle<T>> {
        self.inner
            .entries
            .borrow()
            .iter()
            .find(|entry| &entry.row.item_id == item_id)
            .map(|entry| entry.handle.clone())
    }

    /// Handles of the items still pending.
    pub fn pending_handles(&self) -> Vec<TaskHandle<T>> {
        self.inner
            .entries
            .borrow()
            .iter()
            .filter(|entry| !entry.row.status.is_settled())
            .map(|entry| entry.handle.clone())
            .collect()
    }

    /// The verdict, once every item settled.
    pub fn verdict(&self) -> Option<BatchVerdict> {
        self.inner.verdict.borrow().clone()
    }

    /// Wait until every item settled and return the verdict. Never
    /// short-circuits on the first failure.
    pub async fn join(&self) -> BatchVerdict {
        loop {
            let notified = self.inner.done.notified();
            if let Some(verdict) = self.verdict() {
                return verdict;
            }
            notified.await;
        }
    }

    /// Listen for per-item status text changes.
    pub fn on_item_changed<F>(&self, listener: F)
    where
        F: Fn(&ItemUpdate) + 'static,
    {
        self.inner.item_changed.connect(listener);
    }

    /// Listen for the verdict. Emitted once.
    pub fn on_finished<F>(&self, listener: F)
    where
        F: Fn(&bool) + 'static,
    {
        self.inner.finished.connect(listener);
    }
}

/// Launches batches of supervised tasks.
pub struct BatchCoordinator<S> {
    runner: TaskRunner<S>,
    config: BatchConfig,
}

impl<S: Clone> Clone for BatchCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            runner: self.runner.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S> BatchCoordinator<S>
where
    S: Spawn + Clone + 'static,
{
    /// Create a coordinator with default status texts.
    pub fn new(runner: TaskRunner<S>) -> Self {
        Self::with_config(runner, BatchConfig::default())
    }

    /// Create a coordinator with explicit configuration.
    pub fn with_config(runner: TaskRunner<S>, config: BatchConfig) -> Self {
        Self { runner, config }
    }

    /// The runner items are spawned on.
    pub fn runner(&self) -> &TaskRunner<S> {
        &self.runner
    }

    /// Spawn every item and return the record. Each entry starts with the
    /// pending text.
    ///
    /// # Errors
    ///
    /// [`TaskError::AlreadyAttached`] when two items share an identity or an
    /// item's operation is already attached. Nothing is spawned in that case.
    pub fn launch_all<T: 'static>(
        &self,
        items: Vec<BatchItem<T>>,
    ) -> Result<BatchRecord<T>, TaskError> {
        let ctx = self.runner.context();
        let mut seen = HashSet::new();
        for item in &items {
            if !seen.insert(item.id().clone()) || ctx.is_attached(item.id()) {
                tracing::error!(item = %item.id(), "batch item is already attached");
                return Err(TaskError::AlreadyAttached(item.id().clone()));
            }
        }

        let mut entries = Vec::with_capacity(items.len());
        for BatchItem { label, operation } in items {
            let item_id = operation.id().clone();
            let handle = self.runner.spawn(operation)?;
            entries.push(Entry {
                row: BatchRow {
                    item_id,
                    label,
                    status: ItemStatus::Pending,
                    text: self.config.pending_text.clone(),
                },
                handle,
            });
        }
        tracing::info!(items = entries.len(), "batch launched");

        let inner = Rc::new(RecordInner {
            remaining: Cell::new(entries.len()),
            entries: RefCell::new(entries),
            verdict: RefCell::new(None),
            item_changed: Signal::new(),
            finished: Signal::new(),
            done: Notify::new(),
            config: self.config.clone(),
        });

        let handles: Vec<TaskHandle<T>> = inner
            .entries
            .borrow()
            .iter()
            .map(|entry| entry.handle.clone())
            .collect();
        if handles.is_empty() {
            let record = Rc::clone(&inner);
            ctx.spawn(async move { record.conclude() });
        }
        for (index, handle) in handles.into_iter().enumerate() {
            let record: Weak<RecordInner<T>> = Rc::downgrade(&inner);
            handle.on_settled(move |outcome| {
                if let Some(record) = record.upgrade() {
                    record.settle_entry(index, outcome);
                }
            });
        }

        Ok(BatchRecord { inner })
    }

    /// Request cancellation of every still-pending item. Settled items are
    /// unaffected. Returns the number of cancellation requests recorded.
    pub fn cancel_all<T: 'static>(&self, record: &BatchRecord<T>) -> usize {
        let cancelled = record
            .pending_handles()
            .iter()
            .filter(|handle| self.runner.cancel(handle))
            .count();
        tracing::info!(cancelled, "batch cancellation requested");
        cancelled
    }

    /// Initialize every instrument concurrently. Items are named after the
    /// instrument and labelled with its class.
    ///
    /// # Errors
    ///
    /// Same as [`BatchCoordinator::launch_all`].
    pub fn initialize_all(
        &self,
        instruments: &[Rc<dyn Instrument>],
    ) -> Result<BatchRecord<()>, TaskError> {
        self.launch_all(
            instruments
                .iter()
                .map(|instrument| {
                    let device = Rc::clone(instrument);
                    BatchItem::new(
                        instrument.class(),
                        Operation::new(instrument.name(), async move { device.initialize().await }),
                    )
                })
                .collect(),
        )
    }

    /// Finalize every instrument concurrently.
    ///
    /// # Errors
    ///
    /// Same as [`BatchCoordinator::launch_all`].
    pub fn finalize_all(
        &self,
        instruments: &[Rc<dyn Instrument>],
    ) -> Result<BatchRecord<()>, TaskError> {
        self.launch_all(
            instruments
                .iter()
                .map(|instrument| {
                    let device = Rc::clone(instrument);
                    BatchItem::new(
                        instrument.class(),
                        Operation::new(instrument.name(), async move { device.finalize().await }),
                    )
                })
                .collect(),
        )
    }
}
