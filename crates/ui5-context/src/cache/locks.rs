//
// cache/locks.rs
//
// Per-key async mutual exclusion for check-then-set sequences with
// intervening I/O
//

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Entries are pruned once this many keys have accumulated.
const PRUNE_THRESHOLD: usize = 256;

/// Map of lazily created async mutexes, one per key.
///
/// Callers re-check the cache after acquiring the guard; whoever computed
/// the value first has already stored it.
#[derive(Debug)]
pub struct KeyedLocks<K: Eq + Hash> {
    inflight: DashMap<K, Arc<AsyncMutex<()>>>,
}

impl<K: Eq + Hash> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        if self.inflight.len() > PRUNE_THRESHOLD {
            self.prune();
        }
        let lock = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop mutexes nobody holds or waits on.
    pub fn prune(&self) {
        self.inflight.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }
}
