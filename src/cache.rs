//! Generic LRU+TTL cache (spec §4.5 selector-candidate cache, §5
//! "AdvancedCache"): bounded size, time-based expiry, least-recently-used
//! eviction of a fixed fraction when full, lazy purge of expired entries.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_used: Instant,
}

/// Not thread-safe on its own; callers share it behind a `tokio::sync::Mutex`
/// or `RwLock`, matching the rest of the crate's concurrency idiom.
pub struct LruTtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    ttl: Duration,
    max_entries: usize,
    evict_fraction: f64,
    hits: u64,
    misses: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> LruTtlCache<K, V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_entries,
            evict_fraction: 0.1,
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        self.purge_expired();
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = Instant::now();
                self.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, key: K, value: V) {
        self.purge_expired();
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict_lru();
        }
        let now = Instant::now();
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                last_used: now,
            },
        );
    }

    fn purge_expired(&mut self) {
        let ttl = self.ttl;
        let now = Instant::now();
        self.entries.retain(|_, e| now.duration_since(e.inserted_at) < ttl);
    }

    /// Evict the least-recently-used 10% (rounded up to at least one entry).
    fn evict_lru(&mut self) {
        let to_evict = ((self.entries.len() as f64 * self.evict_fraction).ceil() as usize).max(1);
        let mut by_recency: Vec<(K, Instant)> = self
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.last_used))
            .collect();
        by_recency.sort_by_key(|(_, last_used)| *last_used);
        for (key, _) in by_recency.into_iter().take(to_evict) {
            self.entries.remove(&key);
        }
    }

    /// `hits / (hits + misses)`; the source's cache-statistics `hitRate`
    /// formula is not otherwise specified (spec §9 open question).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_when_full() {
        let mut cache = LruTtlCache::new(Duration::from_secs(3600), 10);
        for i in 0..10 {
            cache.put(i, i * 10);
        }
        // Touch everything except key 0 so it becomes the LRU entry.
        for i in 1..10 {
            cache.get(&i);
        }
        cache.put(10, 100);
        assert!(cache.get(&0).is_none());
        assert_eq!(cache.len(), 10);
    }

    #[test]
    fn expired_entries_are_purged_lazily() {
        let mut cache = LruTtlCache::new(Duration::from_millis(1), 10);
        cache.put("a", 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&"a").is_none());
    }

    #[test]
    fn hit_rate_reflects_gets() {
        let mut cache: LruTtlCache<&str, i32> = LruTtlCache::new(Duration::from_secs(60), 10);
        cache.put("a", 1);
        cache.get(&"a");
        cache.get(&"missing");
        assert_eq!(cache.hit_rate(), 0.5);
    }
}
