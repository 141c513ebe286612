//! Known-Object Cache - bounded TTL map of recently touched objects.
//!
//! A pure cache: losing an entry only costs a store read. Expired entries are
//! dropped lazily on read and swept when the cache reaches capacity.

use crate::domain::{Object, HEIGHT_REJECTED};
use dashmap::DashMap;
use shared_types::{short_hash, Hash};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

struct CachedObject {
    object: Object,
    expires_at: Instant,
}

impl CachedObject {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Statistics for the known-object cache
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Reads answered from the cache
    pub hits: AtomicU64,
    /// Reads that fell through
    pub misses: AtomicU64,
    /// Entries dropped by expiry or capacity
    pub evictions: AtomicU64,
}

/// Bounded TTL cache keyed by transaction ID.
pub struct KnownObjects {
    entries: DashMap<Hash, CachedObject>,
    capacity: usize,
    ttl: Duration,
    stats: CacheStats,
}

impl KnownObjects {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            ttl,
            stats: CacheStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Returns a live entry, dropping it if expired.
    pub fn get(&self, id: &Hash) -> Option<Object> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(id) {
            if !entry.is_expired(now) {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.object.clone());
            }
        }
        if self
            .entries
            .remove_if(id, |_, entry| entry.is_expired(now))
            .is_some()
        {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Inserts or replaces an entry with a fresh TTL.
    pub fn insert(&self, id: Hash, object: Object) {
        if !self.entries.contains_key(&id) && self.entries.len() >= self.capacity {
            self.make_room();
        }
        self.entries.insert(
            id,
            CachedObject {
                object,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Moves a cached object to `height`. Returns false if it is not cached.
    pub fn set_height(&self, id: &Hash, height: i64) -> bool {
        match self.entries.get_mut(id) {
            Some(mut entry) => {
                entry.object.set_height(height);
                entry.expires_at = Instant::now() + self.ttl;
                true
            }
            None => false,
        }
    }

    /// Records a rejection. The entry keeps no content.
    pub fn mark_rejected(&self, id: Hash) {
        if !self.set_height(&id, HEIGHT_REJECTED) {
            self.insert(id, Object::rejected());
        }
    }

    pub fn remove(&self, id: &Hash) -> Option<Object> {
        self.entries.remove(id).map(|(_, entry)| entry.object)
    }

    /// Drops every expired entry; returns how many were dropped.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.stats
                .evictions
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, "Swept expired known objects");
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn make_room(&self) {
        if self.remove_expired() > 0 && self.entries.len() < self.capacity {
            return;
        }
        // Still full: evict the entry closest to expiry.
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().expires_at)
            .map(|entry| *entry.key());
        if let Some(id) = oldest {
            self.entries.remove(&id);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(id = %short_hash(&id), "Evicted known object at capacity");
        }
    }
}
