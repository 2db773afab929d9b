//! Presentation-facing snapshot models.
//!
//! Display code (a status table, a step-control panel, a log view) renders
//! these serializable snapshots instead of holding on to live handles.

use serde::Serialize;
use uuid::Uuid;

use crate::core::{
    BatchRecord, BatchRow, ControlState, OperationId, Spawn, StepController, StepStatus,
    TaskHandle,
};

/// Snapshot of a supervised task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSnapshot {
    /// Operation identity.
    pub operation: OperationId,
    /// Invocation identity.
    pub run_id: Uuid,
    /// Outcome label (`pending`, `done`, `failed`, `cancelled`).
    pub outcome: String,
    /// Failure description, when failed.
    pub reason: Option<String>,
    /// Whether cancellation has been requested.
    pub cancel_requested: bool,
}

impl TaskSnapshot {
    /// Capture a task handle.
    pub fn capture<T: 'static>(handle: &TaskHandle<T>) -> Self {
        let outcome = handle.outcome();
        Self {
            operation: handle.id().clone(),
            run_id: handle.run_id(),
            outcome: outcome.label().to_string(),
            reason: outcome.failure().map(|failure| failure.message.clone()),
            cancel_requested: handle.is_cancel_requested(),
        }
    }
}

/// Snapshot of a step controller, enough to render its control panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepperSnapshot {
    /// Operation identity.
    pub operation: OperationId,
    /// Current state.
    pub status: StepStatus,
    /// Enabled controls.
    pub controls: ControlState,
    /// Steps executed so far.
    pub steps_taken: usize,
    /// Failure description, when the operation failed.
    pub failure: Option<String>,
}

impl StepperSnapshot {
    /// Capture a step controller.
    pub fn capture<S: Spawn + Clone + 'static, T: 'static>(controller: &StepController<S, T>) -> Self {
        Self {
            operation: controller.id().clone(),
            status: controller.status(),
            controls: controller.controls(),
            steps_taken: controller.steps_taken(),
            failure: controller.failure().map(|failure| failure.message),
        }
    }
}

/// Snapshot of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSnapshot {
    /// Per-item rows in launch order.
    pub rows: Vec<BatchRow>,
    /// Items still pending.
    pub remaining: usize,
    /// Verdict, once every item settled.
    pub success: Option<bool>,
}

impl BatchSnapshot {
    /// Capture a batch record.
    pub fn capture<T: 'static>(record: &BatchRecord<T>) -> Self {
        Self {
            rows: record.snapshot(),
            remaining: record.remaining(),
            success: record.verdict().map(|verdict| verdict.success),
        }
    }
}

/// Health response.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Operations currently attached to a runner or controller.
    pub attached: usize,
}

/// Return a health payload for a scheduling context.
pub fn health<S: Spawn + Clone + 'static>(ctx: &crate::core::SchedulingContext<S>) -> Health {
    Health {
        ok: true,
        attached: ctx.attached_count(),
    }
}
