//! Deterministic single-threaded scheduler backed by `futures::executor::LocalPool`.
//!
//! Work only runs while the owning pool is driven (`run_until_stalled`,
//! `run_until`, `run`), which makes interleavings reproducible in tests and in
//! hosts that pump their own event loop.

use std::future::Future;

use futures::executor::LocalSpawner;
use futures::task::LocalSpawnExt;

use crate::core::Spawn;

impl Spawn for LocalSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + 'static,
    {
        let _ = self
            .spawn_local(fut)
            .inspect_err(|error| tracing::error!(error = %error, "local pool refused task"));
    }
}
