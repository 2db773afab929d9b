//! Simulated slow voltage source / ammeter wired across a 1 kΩ resistor.
//!
//! Every feature access takes `delay` (a Tokio timer, so it needs a Tokio
//! runtime when non-zero). With a zero delay the instrument never suspends on a
//! timer and can be driven by any executor.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;

use crate::core::{AppResult, Instrument};

/// Load resistance in ohms.
pub const LOAD_OHMS: f64 = 1_000.0;

/// Simulated source/meter.
#[derive(Debug)]
pub struct SimulatedInstrument {
    name: String,
    class: String,
    delay: Duration,
    voltage: Cell<f64>,
    initialized: Cell<bool>,
    failing: RefCell<HashSet<String>>,
    calls: RefCell<Vec<String>>,
}

impl SimulatedInstrument {
    /// Create an instrument with no delay.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: "SlowDriver".into(),
            delay: Duration::ZERO,
            voltage: Cell::new(0.0),
            initialized: Cell::new(false),
            failing: RefCell::new(HashSet::new()),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Set the per-access delay.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the driver class label.
    #[must_use]
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }

    /// Make an action fail. `action` is `initialize`, `finalize`, or a feature
    /// name such as `voltage`.
    pub fn fail_on(&self, action: impl Into<String>) {
        self.failing.borrow_mut().insert(action.into());
    }

    /// Stop failing an action.
    pub fn heal(&self, action: &str) {
        self.failing.borrow_mut().remove(action);
    }

    /// Current output voltage.
    pub fn voltage(&self) -> f64 {
        self.voltage.get()
    }

    /// Whether `initialize` succeeded and `finalize` has not run since.
    pub fn is_initialized(&self) -> bool {
        self.initialized.get()
    }

    /// Log of actions performed, oldest first (`update voltage=0.5`).
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    async fn access(&self, action: &str, entry: String) -> AppResult<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls.borrow_mut().push(entry);
        if self.failing.borrow().contains(action) {
            bail!("{}: {action} failed", self.name);
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl Instrument for SimulatedInstrument {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &str {
        &self.class
    }

    async fn initialize(&self) -> AppResult<()> {
        self.access("initialize", "initialize".into()).await?;
        self.voltage.set(0.0);
        self.initialized.set(true);
        tracing::debug!(instrument = %self.name, "initialized");
        Ok(())
    }

    async fn finalize(&self) -> AppResult<()> {
        self.access("finalize", "finalize".into()).await?;
        self.voltage.set(0.0);
        self.initialized.set(false);
        tracing::debug!(instrument = %self.name, "finalized");
        Ok(())
    }

    async fn query(&self, feature: &str) -> AppResult<f64> {
        self.access(feature, format!("query {feature}")).await?;
        match feature {
            "voltage" => Ok(self.voltage.get()),
            "current" => Ok(self.voltage.get() / LOAD_OHMS),
            other => Err(anyhow!("{}: unknown feature `{other}`", self.name)),
        }
    }

    async fn update(&self, feature: &str, value: f64) -> AppResult<()> {
        self.access(feature, format!("update {feature}={value}")).await?;
        match feature {
            "voltage" => {
                self.voltage.set(value);
                Ok(())
            }
            other => Err(anyhow!("{}: `{other}` is read-only or unknown", self.name)),
        }
    }
}
