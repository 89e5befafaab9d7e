//! Read-through cache of decoded payloads, keyed by NID.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

/// Entries kept per event kind unless configured otherwise.
pub const DEFAULT_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

/// A bounded, thread-safe map from payload NID to decoded event.
///
/// Presence is only ever an optimisation: a miss says nothing about whether
/// the payload row exists.
pub struct NidCache<T> {
    entries: Mutex<LruCache<i64, Arc<T>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T> NidCache<T> {
    /// Creates an empty cache holding at most `capacity` events.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Looks up `nid`, marking it recently used and counting a hit or miss.
    pub fn get(&self, nid: i64) -> Option<Arc<T>> {
        let found = self.entries.lock().get(&nid).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Caches `value`, dropping the least recently used entry when full.
    pub fn insert(&self, nid: i64, value: Arc<T>) {
        self.entries.lock().put(nid, value);
    }

    /// Forgets `nid`. Called once its payload row is gone.
    pub fn evict(&self, nid: i64) {
        self.entries.lock().pop(&nid);
    }

    /// Whether `nid` is cached, without touching recency or counters.
    pub fn contains(&self, nid: i64) -> bool {
        self.entries.lock().contains(&nid)
    }

    /// Number of cached events.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lookups answered from the cache so far.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookups that found nothing so far.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl<T> std::fmt::Debug for NidCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NidCache")
            .field("len", &self.len())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_counts_hits_and_misses() {
        let cache = NidCache::new(DEFAULT_CACHE_CAPACITY);
        cache.insert(1, Arc::new("one"));

        assert_eq!(cache.get(1).as_deref(), Some(&"one"));
        assert!(cache.get(2).is_none());
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
    }

    #[test]
    fn evict_removes_only_the_named_entry() {
        let cache = NidCache::new(DEFAULT_CACHE_CAPACITY);
        cache.insert(1, Arc::new(1u8));
        cache.insert(2, Arc::new(2u8));
        cache.evict(1);

        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn least_recently_used_entry_is_dropped_at_capacity() {
        let cache = NidCache::new(NonZeroUsize::new(2).unwrap());
        cache.insert(1, Arc::new(()));
        cache.insert(2, Arc::new(()));
        cache.get(1);
        cache.insert(3, Arc::new(()));

        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert!(cache.contains(3));
    }

    #[test]
    fn concurrent_access_is_safe() {
        let cache = Arc::new(NidCache::new(DEFAULT_CACHE_CAPACITY));
        let handles: Vec<_> = (0..8i64)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let nid = t * 100 + i;
                        cache.insert(nid, Arc::new(nid));
                        assert_eq!(cache.get(nid).as_deref(), Some(&nid));
                        cache.evict(nid);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.is_empty());
    }
}
