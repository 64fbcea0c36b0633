//! Per-model advisory lock registry
//!
//! Lifecycle operations on the same daemon model must not interleave: a Read
//! racing an Update could otherwise observe the window between delete and
//! pull. Locks are keyed by canonical model name so `llama2` and
//! `llama2:latest` share one lock.

use crate::ollama::canonical_name;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Guard held for the duration of one lifecycle operation
#[derive(Debug)]
pub struct ModelLock {
    names: Vec<String>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl ModelLock {
    /// Canonical names covered by this guard, in acquisition order
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Thread-safe registry of per-name async mutexes
#[derive(Debug, Clone, Default)]
pub struct LockRegistry {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, canonical: &str) -> Arc<Mutex<()>> {
        // clone out of the map so no shard lock is held across an await
        self.locks
            .entry(canonical.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Acquire the lock for one model name
    pub async fn acquire(&self, name: &str) -> ModelLock {
        self.acquire_many([name]).await
    }

    /// Acquire the locks for several model names.
    ///
    /// Names are canonicalized, deduplicated and taken in sorted order so two
    /// operations touching the same pair of models cannot deadlock.
    pub async fn acquire_many<'a, I>(&self, names: I) -> ModelLock
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut canonical: Vec<String> = names.into_iter().map(canonical_name).collect();
        canonical.sort();
        canonical.dedup();

        let mut guards = Vec::with_capacity(canonical.len());
        for name in &canonical {
            let lock = self.lock_for(name);
            guards.push(lock.lock_owned().await);
        }

        tracing::trace!(models = ?canonical, "Acquired model locks");
        ModelLock {
            names: canonical,
            _guards: guards,
        }
    }
}
