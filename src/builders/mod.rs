//! Builders to construct sequencer components from configuration.

pub mod sequencer_builder;

pub use sequencer_builder::{Sequencer, SequencerBuilder};
