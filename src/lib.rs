//! # Lab Sequencer
//!
//! Cooperative task control for interactive, single-threaded instrument-control
//! applications.
//!
//! Long hardware sequences (bias sweeps, device bring-up, slow meter reads) run
//! as suspendable operations on an injected cooperative scheduler, so the
//! thread that serves user input and screen updates never blocks on them.
//!
//! ## Key Features
//!
//! - **Supervised tasks**: [`core::TaskRunner`] schedules an operation and hands
//!   back a [`core::TaskHandle`]. Failures are captured with their error chain,
//!   always logged, and additionally reported when nothing observes them.
//! - **Manual step control**: [`core::StepController`] drives an operation one
//!   breakpoint at a time through `PAUSED` / `RUNNING` / `FINISHED`, with
//!   run, pause, single-step and cancel.
//! - **Batches**: [`core::BatchCoordinator`] launches several independent
//!   operations, keeps a per-item status record and produces a verdict only
//!   after every item settled.
//! - **Guaranteed cleanup**: every operation's finalizer runs exactly once,
//!   whether it completed, failed or was cancelled.
//! - **Deterministic tests**: the scheduler is a [`core::Spawn`] implementation
//!   passed in by the host; `futures::executor::LocalPool` drives it in tests
//!   and a Tokio `LocalSet` in applications.
//!
//! ```rust,ignore
//! use lab_sequencer::builders::SequencerBuilder;
//! use lab_sequencer::core::Operation;
//! use lab_sequencer::runtime::TokioLocalSpawner;
//!
//! let local = tokio::task::LocalSet::new();
//! local.block_on(&rt, async {
//!     let seq = SequencerBuilder::new().build(TokioLocalSpawner::new())?;
//!
//!     let sweep = Operation::with_breakpoints("bias-sweep", move |bp| async move {
//!         for volts in [0.0, 0.5, 1.0] {
//!             source.update("voltage", volts).await?;
//!             bp.reached().await;
//!         }
//!         Ok(())
//!     });
//!     let stepper = seq.step_controller(sweep)?;
//!     stepper.run();
//!     // ... later, from a button handler:
//!     stepper.pause();
//!     stepper.step().await?;
//! });
//! ```
//!
//! For complete examples, see:
//! - `tests/stepper_test.rs` - run / pause / step scenarios
//! - `tests/batch_test.rs` - device bring-up with partial failure

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core task-control abstractions.
pub mod core;
/// Configuration models for the runner, step controller and batches.
pub mod config;
/// Builders to construct sequencer components from configuration.
pub mod builders;
/// Infrastructure adapters for instrument drivers.
pub mod infra;
/// Runtime adapters and presentation snapshots.
pub mod runtime;
/// Shared utilities.
pub mod util;
