//! Per-match mutual exclusion.
//!
//! Each match id maps to its own async mutex. Entries are created on demand
//! and dropped again once nobody holds or waits for them, so the registry only
//! grows with the number of matches being mutated right now.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct MatchLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

/// Held for the duration of one state transition.
pub struct MatchGuard {
    id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl MatchLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: Uuid) -> MatchGuard {
        let lock = self
            .locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        MatchGuard {
            id,
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    /// Number of matches with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for MatchGuard {
    fn drop(&mut self) {
        // Release first so the map's reference is the only one left
        self.guard.take();
        self.locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
