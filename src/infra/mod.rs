//! Infrastructure adapters for instrument drivers.

pub mod instrument;
