//! Build a scheduling context, runner and batch coordinator from configuration.

use crate::config::SequencerConfig;
use crate::core::{
    BatchCoordinator, Operation, SchedulingContext, SharedAuditSink, Spawn, StepController,
    TaskError, TaskRunner,
};

/// Builder for [`Sequencer`].
#[derive(Default)]
pub struct SequencerBuilder {
    config: SequencerConfig,
    audit: Option<SharedAuditSink>,
}

impl SequencerBuilder {
    /// Start from default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given configuration.
    #[must_use]
    pub fn config(mut self, config: SequencerConfig) -> Self {
        self.config = config;
        self
    }

    /// Record lifecycle events into an audit sink.
    #[must_use]
    pub fn audit(mut self, audit: SharedAuditSink) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Validate configuration and wire every component to `spawner`.
    ///
    /// # Errors
    ///
    /// [`TaskError::Config`] if the configuration is invalid.
    pub fn build<S: Spawn + Clone + 'static>(self, spawner: S) -> Result<Sequencer<S>, TaskError> {
        self.config.validate().map_err(TaskError::Config)?;

        let mut ctx = SchedulingContext::new(spawner);
        if let Some(audit) = self.audit {
            ctx = ctx.with_audit(audit);
        }
        let runner = TaskRunner::with_config(ctx.clone(), self.config.runner.clone());
        let coordinator = BatchCoordinator::with_config(runner.clone(), self.config.batch.clone());
        tracing::debug!(config = ?self.config, "sequencer built");

        Ok(Sequencer {
            ctx,
            runner,
            coordinator,
            config: self.config,
        })
    }
}

/// Components sharing one scheduling context.
pub struct Sequencer<S> {
    ctx: SchedulingContext<S>,
    runner: TaskRunner<S>,
    coordinator: BatchCoordinator<S>,
    config: SequencerConfig,
}

impl<S: Spawn + Clone + 'static> Sequencer<S> {
    /// Shared scheduling context.
    pub fn context(&self) -> &SchedulingContext<S> {
        &self.ctx
    }

    /// Supervised task runner.
    pub fn runner(&self) -> &TaskRunner<S> {
        &self.runner
    }

    /// Batch coordinator.
    pub fn coordinator(&self) -> &BatchCoordinator<S> {
        &self.coordinator
    }

    /// Configuration the components were built from.
    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Put an operation under manual step control.
    ///
    /// # Errors
    ///
    /// [`TaskError::AlreadyAttached`] if the operation is already owned.
    pub fn step_controller<T: 'static>(
        &self,
        operation: Operation<T>,
    ) -> Result<StepController<S, T>, TaskError> {
        StepController::new(self.ctx.clone(), operation)
    }
}
