//! Argument-keyed result cache with a size bound, optional expiry and manual invalidation.

use crate::config::CacheSettings;
use log::debug;
use lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

struct Entry<V> {
    stored_at: Instant,
    value: V,
}

/// Least-recently-used cache whose entries go stale after `ttl`.
///
/// Errors from the compute closure are returned and never stored.
pub struct QueryCache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, Entry<V>>>,
    ttl: Option<Duration>,
}

impl<K: Hash + Eq, V: Clone> QueryCache<K, V> {
    pub fn new(settings: CacheSettings) -> Self {
        let capacity = NonZeroUsize::new(settings.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: settings.ttl,
        }
    }

    fn is_fresh(&self, entry: &Entry<V>) -> bool {
        self.ttl
            .is_none_or(|ttl| entry.stored_at.elapsed() < ttl)
    }

    /// Fresh cached value for `key`, if any. Expired entries are dropped.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        let fresh = entries.get(key).map(|entry| self.is_fresh(entry))?;
        if fresh {
            entries.get(key).map(|entry| entry.value.clone())
        } else {
            debug!("Dropping expired cache entry");
            entries.pop(key);
            None
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.lock().put(
            key,
            Entry {
                stored_at: Instant::now(),
                value,
            },
        );
    }

    /// Returns the cached value or computes, stores and returns it.
    ///
    /// The lock is not held while `compute` runs, so concurrent misses on the
    /// same key may both compute; the last one stored wins.
    pub fn get_or_try_insert_with<F>(&self, key: K, compute: F) -> anyhow::Result<V>
    where
        F: FnOnce() -> anyhow::Result<V>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = compute()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.lock().pop(key);
    }

    pub fn invalidate_all(&self) {
        let mut entries = self.entries.lock();
        debug!("Invalidating {} cache entries", entries.len());
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn cache(capacity: usize, ttl: Option<Duration>) -> QueryCache<String, u32> {
        QueryCache::new(CacheSettings { capacity, ttl })
    }

    #[test]
    fn test_repeated_call_is_served_from_cache() {
        let cache = cache(4, None);
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok(7)
        };

        assert_eq!(cache.get_or_try_insert_with("k".to_string(), compute).unwrap(), 7);
        assert_eq!(cache.get_or_try_insert_with("k".to_string(), compute).unwrap(), 7);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = cache(4, None);
        let failed = cache.get_or_try_insert_with("k".to_string(), || anyhow::bail!("storage down"));
        assert!(failed.is_err());
        assert!(cache.is_empty());

        let value = cache.get_or_try_insert_with("k".to_string(), || Ok(3)).unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn test_invalidation_forces_recompute() {
        let cache = cache(4, None);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);

        cache.invalidate(&"a".to_string());
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.get(&"b".to_string()), Some(2));

        cache.invalidate_all();
        assert!(cache.is_empty());
        let recomputed = cache.get_or_try_insert_with("b".to_string(), || Ok(20)).unwrap();
        assert_eq!(recomputed, 20);
    }

    #[test]
    fn test_expired_entries_are_recomputed() {
        let cache = cache(4, Some(Duration::from_millis(20)));
        cache.insert("k".to_string(), 1);
        assert_eq!(cache.get(&"k".to_string()), Some(1));

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get(&"k".to_string()), None);
        assert!(cache.is_empty());
        assert_eq!(cache.get_or_try_insert_with("k".to_string(), || Ok(2)).unwrap(), 2);
    }

    #[test]
    fn test_least_recently_used_entry_is_evicted() {
        let cache = cache(2, None);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        cache.insert("c".to_string(), 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"b".to_string()), None);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"c".to_string()), Some(3));
    }

    #[test]
    fn test_zero_capacity_still_holds_one_entry() {
        let cache = cache(0, None);
        cache.insert("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
    }
}
