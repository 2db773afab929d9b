//! Runtime adapters (Tokio local set, deterministic local pool) and the
//! presentation-facing snapshot surface.

pub mod api;
pub mod local_pool;
pub mod tokio_spawner;

pub use api::{health, BatchSnapshot, Health, StepperSnapshot, TaskSnapshot};
pub use tokio_spawner::TokioLocalSpawner;
