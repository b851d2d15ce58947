//! Concurrency gate around the content index.
//!
//! Three independent controls:
//! - a global store lock serializing every read-decide or write step against
//!   the store, so two lookups never both act on a half-written entry;
//! - per-path build locks, so at most one lookup decides and rebuilds a given
//!   path at a time while other paths proceed;
//! - a semaphore bounding how many parses/hashes run at once during batch
//!   work.
//!
//! Parsing, hashing and folding run while holding only the build lock and a
//! work permit, never the store lock.

use crate::error::{Result, TextdexError};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};

pub struct IndexGate {
    store_lock: Mutex<()>,
    build_locks: DashMap<String, Arc<Mutex<()>>>,
    work_permits: Arc<Semaphore>,
}

impl IndexGate {
    pub fn new(max_parallelism: usize) -> Self {
        Self {
            store_lock: Mutex::new(()),
            build_locks: DashMap::new(),
            work_permits: Arc::new(Semaphore::new(max_parallelism.max(1))),
        }
    }

    /// Exclusive access to the store for one read-decide or write step.
    pub async fn store(&self) -> MutexGuard<'_, ()> {
        self.store_lock.lock().await
    }

    /// Exclusive right to decide about and rebuild `path`.
    pub async fn build_lock(&self, path: &str) -> BuildGuard<'_> {
        let lock = self
            .build_locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        BuildGuard {
            gate: self,
            path: path.to_string(),
            guard: Some(guard),
        }
    }

    /// One slot of parse/hash work.
    pub async fn work_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.work_permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| TextdexError::Other(format!("work limiter closed: {}", e)))
    }

    /// Paths with a build lock currently held or awaited.
    pub fn active_builds(&self) -> usize {
        self.build_locks.len()
    }

    pub fn available_permits(&self) -> usize {
        self.work_permits.available_permits()
    }
}

/// Held while a path is being checked or rebuilt. The map entry is dropped
/// once nobody else is waiting for it.
pub struct BuildGuard<'a> {
    gate: &'a IndexGate,
    path: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.gate
            .build_locks
            .remove_if(&self.path, |_, lock| Arc::strong_count(lock) == 1);
    }
}
