//! Configuration models for the runner and batch coordinator.

pub mod sequencer;

pub use sequencer::{BatchConfig, RunnerConfig, SequencerConfig};
