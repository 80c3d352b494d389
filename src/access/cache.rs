// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bounded LRU cache with per-entry expiry.
//!
//! Backs both the tier cache and the delegation cache. An entry past its
//! expiry is never returned: it is dropped on the lookup that finds it.
//!
//! Readers that fetch a value slowly take a [`generation`](TtlCache::generation)
//! first and store with [`put_if_current`](TtlCache::put_if_current), so an
//! invalidation that lands mid-fetch is never overwritten by the older value.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lru::LruCache;

/// A cached value together with the time it was computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cached<V> {
    pub value: V,
    pub computed_at: DateTime<Utc>,
}

struct CacheEntry<V> {
    value: V,
    computed_at: DateTime<Utc>,
    expires_at: Instant,
}

struct Inner<K: Hash + Eq, V> {
    entries: LruCache<K, CacheEntry<V>>,
    /// Stamp of each key's latest invalidation.
    invalidations: LruCache<K, u64>,
    /// Last stamp handed out.
    stamp: u64,
    /// Highest stamp evicted from `invalidations`; stands in for any key
    /// without a stamp of its own.
    floor: u64,
}

impl<K: Hash + Eq, V> Inner<K, V> {
    fn generation(&self, key: &K) -> u64 {
        self.invalidations.peek(key).copied().unwrap_or(self.floor)
    }
}

/// In-process LRU cache keyed by wallet address (or any hashable key).
pub struct TtlCache<K: Hash + Eq, V> {
    cache: Mutex<Inner<K, V>>,
    ttl: Duration,
}

impl<K: Hash + Eq + Clone, V: Clone> TtlCache<K, V> {
    /// Create a new cache with the given capacity and TTL.
    ///
    /// - `capacity`: Max number of keys held; least recently used is evicted.
    /// - `ttl`: Time-to-live for each entry.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                invalidations: LruCache::new(capacity),
                stamp: 0,
                floor: 0,
            }),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a live entry. Returns `None` if absent or expired.
    pub fn get(&self, key: &K) -> Option<Cached<V>> {
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.entries.get(key) {
            if Instant::now() < entry.expires_at {
                return Some(Cached {
                    value: entry.value.clone(),
                    computed_at: entry.computed_at,
                });
            }
            cache.entries.pop(key);
        }
        None
    }

    /// Store a value, replacing any previous entry for the key.
    pub fn put(&self, key: K, value: V) -> Cached<V> {
        let computed_at = Utc::now();
        if let Ok(mut cache) = self.cache.lock() {
            cache.entries.put(key, self.entry(value.clone(), computed_at));
        }
        Cached { value, computed_at }
    }

    /// Invalidation generation of `key`; pass it to
    /// [`put_if_current`](Self::put_if_current) after fetching.
    pub fn generation(&self, key: &K) -> u64 {
        self.cache
            .lock()
            .map(|cache| cache.generation(key))
            .unwrap_or(u64::MAX)
    }

    /// Store a value only if `key` was not invalidated since `generation`
    /// was taken. Returns `None` when the value was discarded.
    pub fn put_if_current(&self, key: K, value: V, generation: u64) -> Option<Cached<V>> {
        let mut cache = self.cache.lock().ok()?;
        if cache.generation(&key) != generation {
            return None;
        }
        let computed_at = Utc::now();
        cache.entries.put(key, self.entry(value.clone(), computed_at));
        Some(Cached { value, computed_at })
    }

    /// Remove the entry for a key unconditionally.
    pub fn invalidate(&self, key: &K) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.entries.pop(key);
            cache.stamp += 1;
            let stamp = cache.stamp;
            if let Some((evicted, old)) = cache.invalidations.push(key.clone(), stamp) {
                if evicted != *key {
                    cache.floor = cache.floor.max(old);
                }
            }
        }
    }

    /// Keys of live entries whose value matches the predicate.
    ///
    /// Does not touch LRU recency.
    pub fn keys_where(&self, mut predicate: impl FnMut(&V) -> bool) -> Vec<K> {
        let now = Instant::now();
        match self.cache.lock() {
            Ok(cache) => cache
                .entries
                .iter()
                .filter(|(_, entry)| now < entry.expires_at && predicate(&entry.value))
                .map(|(key, _)| key.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, value: V, computed_at: DateTime<Utc>) -> CacheEntry<V> {
        CacheEntry {
            value,
            computed_at,
            expires_at: Instant::now() + self.ttl,
        }
    }
}
