//! Core task-control abstractions: operations, supervised tasks, step control
//! and batch coordination.

pub mod error;
pub mod operation;
pub mod handle;
pub mod scheduler;
pub mod runner;
pub mod stepper;
pub mod batch;
pub mod audit;
pub mod instrument;

pub use error::{AppResult, StepError, TaskError};
pub use operation::{Breakpoint, BreakpointReached, Finalizer, Operation, OperationBody, OperationId};
pub use handle::{Outcome, SettleCallback, TaskFailure, TaskHandle};
pub use scheduler::{SchedulingContext, Spawn};
pub use runner::TaskRunner;
pub use stepper::{ControlState, StepController, StepStatus};
pub use batch::{BatchCoordinator, BatchItem, BatchRecord, BatchRow, BatchVerdict, ItemStatus, ItemUpdate};
pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, SharedAuditSink, build_audit_event};
pub use instrument::Instrument;
