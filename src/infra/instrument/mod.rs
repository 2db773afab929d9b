//! Instrument driver implementations.

pub mod simulated;

pub use simulated::SimulatedInstrument;
