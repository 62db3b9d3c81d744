//! A thread-safe, fixed-capacity least-recently-used store. [`CacheStore`] provides concurrent
//! access for readers (e.g., cache-first fetches) and writers (e.g., network refreshes).
//!
//! The store knows nothing about time. Tables that need expiry keep an insertion timestamp next
//! to the value (see [`CacheEntry`]) and check it against their own TTL on access.
use std::{hash::Hash, num::NonZeroUsize, sync::Mutex, time::Duration};

use chrono::{DateTime, Utc};
use lru::LruCache;

/// `CacheStore` is a thread-safe (`Sync`) LRU container.
///
/// Values are never mutated in place: updates replace the stored value completely. Every
/// operation holds the internal lock only for the duration of the in-memory update.
pub struct CacheStore<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, V>>,
}

impl<K: Hash + Eq, V: Clone> CacheStore<K, V> {
    /// Create a new empty store that holds at most `capacity` entries. A capacity of zero is
    /// treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        CacheStore {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Get a copy of the value stored under `key`, marking it most-recently-used.
    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().get(key).cloned()
    }

    /// Store `value` under `key`, evicting the least-recently-used entry if the store is full.
    pub fn put(&self, key: K, value: V) {
        self.lock().put(key, value);
    }

    /// Remove the value stored under `key`, returning it.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.lock().pop(key)
    }

    /// Remove the value stored under `key` only if `predicate` holds for it. The check and the
    /// removal happen under a single lock. Returns `true` if the value was removed.
    pub fn remove_if(&self, key: &K, predicate: impl FnOnce(&V) -> bool) -> bool {
        let mut entries = self.lock();
        if entries.peek(key).is_some_and(predicate) {
            entries.pop(key);
            true
        } else {
            false
        }
    }

    /// Atomically decide whether to replace the value under `key`.
    ///
    /// `update` receives the current value (if any) and returns the replacement, or `None` to
    /// leave the store untouched. No other operation on the store can interleave between
    /// reading the current value and writing the replacement. Returns `true` if the value was
    /// replaced.
    pub fn replace_with(&self, key: K, update: impl FnOnce(Option<&V>) -> Option<V>) -> bool {
        let mut entries = self.lock();
        match update(entries.get(&key)) {
            Some(value) => {
                entries.put(key, value);
                true
            }
            None => false,
        }
    }

    /// Number of stored entries.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<K, V>> {
        // Err() is possible only if the lock is poisoned (a thread panicked while holding the
        // lock), which should never happen as no user code runs under it.
        self.entries
            .lock()
            .expect("thread holding cache lock should not panic")
    }
}

/// A value with the time it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub inserted_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, inserted_at: DateTime<Utc>) -> Self {
        CacheEntry { value, inserted_at }
    }

    /// An entry is valid while its age is strictly less than `ttl`.
    pub fn is_valid(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        is_within(self.inserted_at, ttl, now)
    }
}

/// Returns `true` if less than `ttl` has passed between `since` and `now`. Clock skew (`since`
/// in the future) counts as zero age.
pub(crate) fn is_within(since: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(since)
        .to_std()
        .map_or(true, |age| age < ttl)
}
