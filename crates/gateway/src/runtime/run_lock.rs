//! Per-run single-writer enforcement (spec I-4: "exactly one runner
//! instance may drive a given `run_id` at a time").
//!
//! Same shape as the session lock this replaces: each key maps to a
//! `Semaphore(1)`; holding the permit for the run's lifetime is what
//! makes the runner a single-writer actor.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct RunLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for RunLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire exclusive drive rights over `run_id`. Waits if another
    /// actor (e.g. a resume after restart racing the original runner)
    /// currently holds it.
    pub async fn acquire(&self, run_id: &str) -> OwnedSemaphorePermit {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(run_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.acquire_owned()
            .await
            .expect("run lock semaphore is never closed")
    }

    /// Non-blocking variant used by the scheduler, which must not wait
    /// on a run it didn't expect to already be in flight.
    pub fn try_acquire(&self, run_id: &str) -> Option<OwnedSemaphorePermit> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(run_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.try_acquire_owned().ok()
    }

    pub fn run_count(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_access() {
        let map = RunLockMap::new();
        let p1 = map.acquire("r1").await;
        drop(p1);
        let p2 = map.acquire("r1").await;
        drop(p2);
    }

    #[tokio::test]
    async fn different_runs_concurrent() {
        let map = RunLockMap::new();
        let p1 = map.acquire("r1").await;
        let p2 = map.acquire("r2").await;
        assert_eq!(map.run_count(), 2);
        drop(p1);
        drop(p2);
    }

    #[tokio::test]
    async fn try_acquire_fails_while_held() {
        let map = RunLockMap::new();
        let _p1 = map.acquire("r1").await;
        assert!(map.try_acquire("r1").is_none());
    }

    #[tokio::test]
    async fn try_acquire_succeeds_after_release() {
        let map = RunLockMap::new();
        let p1 = map.acquire("r1").await;
        drop(p1);
        assert!(map.try_acquire("r1").is_some());
    }
}
