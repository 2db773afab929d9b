//! Tokio runtime spawner implementation.

use std::future::Future;

use crate::core::Spawn;

/// Spawner that schedules work on the current thread's [`tokio::task::LocalSet`].
///
/// Futures spawned through it need not be `Send`. Every call must happen
/// inside `LocalSet::run_until` / `LocalSet::block_on` (or a
/// `#[tokio::main(flavor = "current_thread")]` body driven by a local set);
/// `tokio::task::spawn_local` panics otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioLocalSpawner;

impl TokioLocalSpawner {
    /// Create a new local spawner.
    pub const fn new() -> Self {
        Self
    }
}

impl Spawn for TokioLocalSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + 'static,
    {
        drop(tokio::task::spawn_local(fut));
    }
}
