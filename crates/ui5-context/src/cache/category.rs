//
// cache/category.rs
//
// Typed key -> value stores with interior mutability
//

use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{RwLock, RwLockWriteGuard};

use lru::LruCache;

/// One independent category of the cache store.
///
/// Values are stored as-is and cloned out on `get`; categories holding large
/// artifacts store `Arc`s so a hit is a reference-count bump. A poisoned lock
/// reads as an empty category.
#[derive(Debug)]
pub struct Category<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for Category<K, V> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Category<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.read().ok()?.get(key).cloned()
    }

    pub fn set(&self, key: K, value: V) {
        if let Ok(mut guard) = self.inner.write() {
            guard.insert(key, value);
        }
    }

    /// Remove an entry; true if it was present.
    pub fn delete(&self, key: &K) -> bool {
        self.inner
            .write()
            .map(|mut guard| guard.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Snapshot of the current keys.
    pub fn keys(&self) -> Vec<K> {
        self.inner
            .read()
            .map(|guard| guard.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner
            .read()
            .map(|guard| guard.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every entry matching `predicate`.
    pub fn entries_where(&self, predicate: impl Fn(&K, &V) -> bool) -> Vec<(K, V)> {
        self.inner
            .read()
            .map(|guard| {
                guard
                    .iter()
                    .filter(|(k, v)| predicate(k, v))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.write() {
            guard.clear();
        }
    }

    /// Write guard used by `CacheStore::reset` to clear several categories
    /// while holding all of their locks.
    pub(crate) fn lock(&self) -> Option<RwLockWriteGuard<'_, HashMap<K, V>>> {
        self.inner.write().ok()
    }
}

/// Bounded category with least-recently-inserted eviction.
///
/// Reads use `peek()` so they work under the read lock and do not promote.
pub struct LruCategory<K: Hash + Eq, V> {
    inner: RwLock<LruCache<K, V>>,
}

impl<K: Hash + Eq, V> std::fmt::Debug for LruCategory<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCategory").finish_non_exhaustive()
    }
}

fn capacity(cap: usize) -> NonZeroUsize {
    NonZeroUsize::new(cap).unwrap_or(NonZeroUsize::MIN)
}

impl<K: Eq + Hash + Clone, V: Clone> LruCategory<K, V> {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: RwLock::new(LruCache::new(capacity(cap))),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.read().ok()?.peek(key).cloned()
    }

    pub fn set(&self, key: K, value: V) {
        if let Ok(mut guard) = self.inner.write() {
            if let Some((evicted, _)) = guard.push(key.clone(), value) {
                if evicted != key {
                    log::trace!("Evicted least recently inserted cache entry");
                }
            }
        }
    }

    pub fn delete(&self, key: &K) -> bool {
        self.inner
            .write()
            .map(|mut guard| guard.pop(key).is_some())
            .unwrap_or(false)
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner
            .read()
            .map(|guard| guard.iter().map(|(k, _)| k.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resize(&self, cap: usize) {
        if let Ok(mut guard) = self.inner.write() {
            guard.resize(capacity(cap));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.write() {
            guard.clear();
        }
    }

    pub(crate) fn lock(&self) -> Option<RwLockWriteGuard<'_, LruCache<K, V>>> {
        self.inner.write().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_contract() {
        let category: Category<String, u32> = Category::new();
        assert_eq!(category.get(&"a".to_string()), None);
        category.set("a".into(), 1);
        category.set("b".into(), 2);
        category.set("a".into(), 3);
        assert_eq!(category.get(&"a".to_string()), Some(3));

        let mut keys = category.keys();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

        assert!(category.delete(&"a".to_string()));
        assert!(!category.delete(&"a".to_string()));
        assert_eq!(category.len(), 1);

        category.clear();
        assert!(category.is_empty());
    }

    #[test]
    fn test_entries_where() {
        let category: Category<u32, &str> = Category::new();
        category.set(1, "one");
        category.set(2, "two");
        category.set(3, "three");
        let mut odd = category.entries_where(|k, _| k % 2 == 1);
        odd.sort();
        assert_eq!(odd, vec![(1, "one"), (3, "three")]);
    }

    #[test]
    fn test_lru_category_eviction() {
        let category: LruCategory<String, u32> = LruCategory::with_capacity(2);
        category.set("a".into(), 1);
        category.set("b".into(), 2);
        // peek does not promote, so "a" is still the oldest
        assert_eq!(category.get(&"a".to_string()), Some(1));
        category.set("c".into(), 3);
        assert_eq!(category.get(&"a".to_string()), None);
        assert_eq!(category.len(), 2);

        category.resize(1);
        assert_eq!(category.len(), 1);
        assert_eq!(category.get(&"c".to_string()), Some(3));
    }

    #[test]
    fn test_lru_zero_capacity_is_clamped() {
        let category: LruCategory<u32, u32> = LruCategory::with_capacity(0);
        category.set(1, 1);
        assert_eq!(category.get(&1), Some(1));
        assert!(category.delete(&1));
    }
}
