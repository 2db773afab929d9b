//! Instrument capability boundary.
//!
//! Instrument drivers are external collaborators. The sequencer only needs the
//! two suspending capabilities every driver offers (`query` a feature, `update`
//! a feature) plus the bring-up and shut-down hooks the batch coordinator calls
//! on each device.

use async_trait::async_trait;

use super::AppResult;

/// An asynchronous, single-threaded instrument driver.
#[async_trait(?Send)]
pub trait Instrument {
    /// Display name (also used as the batch item identity).
    fn name(&self) -> &str;

    /// Driver class shown next to the name, e.g. `SourceMeter`.
    fn class(&self) -> &str;

    /// Bring the device into a known state.
    async fn initialize(&self) -> AppResult<()>;

    /// Return the device to a safe state and release it.
    async fn finalize(&self) -> AppResult<()>;

    /// Read a feature, e.g. `current`.
    async fn query(&self, feature: &str) -> AppResult<f64>;

    /// Apply a setting, e.g. `voltage = 0.5`.
    async fn update(&self, feature: &str, value: f64) -> AppResult<()>;
}
