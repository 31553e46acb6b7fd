//! In-memory cache of decoded resources with LRU eviction.
//!
//! Entries are [`DecodedResource`] handles keyed by [`CacheKey`]. The cache
//! budget is measured in pixel bytes. Any resource that leaves the cache,
//! through eviction, replacement, `remove` or `clear`, is recycled; the
//! resource itself defers reclamation while display references are
//! outstanding, so eviction never pulls a buffer out from under a pending
//! display.
//!
//! The cache also owns the per-key [`EditLock`] registry used to serialize
//! decode for identical keys.

use super::edit_lock::{EditLock, EditLocks};
use crate::identity::CacheKey;
use crate::resource::DecodedResource;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Entry in the memory cache.
struct CacheEntry {
    resource: Arc<DecodedResource>,
    /// Last access time for LRU eviction
    last_accessed: Instant,
}

impl CacheEntry {
    fn new(resource: Arc<DecodedResource>) -> Self {
        Self {
            resource,
            last_accessed: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }
}

#[derive(Default)]
struct Entries {
    map: HashMap<CacheKey, CacheEntry>,
    size_bytes: usize,
}

impl Entries {
    fn take(&mut self, key: &CacheKey) -> Option<Arc<DecodedResource>> {
        let entry = self.map.remove(key)?;
        self.size_bytes = self
            .size_bytes
            .saturating_sub(entry.resource.byte_count());
        Some(entry.resource)
    }
}

/// Statistics for monitoring memory cache effectiveness.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entry_count: usize,
    pub size_bytes: usize,
}

impl MemoryCacheStats {
    /// Returns the hit ratio (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// In-memory cache for decoded resources.
pub struct MemoryCache {
    entries: Mutex<Entries>,
    max_size_bytes: usize,
    edit_locks: EditLocks,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryCache {
    /// Creates a memory cache holding at most `max_size_bytes` of pixel data.
    pub fn new(max_size_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            max_size_bytes,
            edit_locks: EditLocks::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Gets a cached resource.
    ///
    /// The returned resource may have been recycled by its owner since it was
    /// inserted; callers that find it recycled evict it with
    /// [`MemoryCache::remove_recycled`] and treat the lookup as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<DecodedResource>> {
        let mut entries = self.entries.lock();
        match entries.map.get_mut(key) {
            Some(entry) => {
                entry.touch();
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(&entry.resource))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Inserts a resource, evicting least recently used entries to make room.
    ///
    /// A resource larger than the whole budget is not cached. A different
    /// resource already stored under `key` is replaced and recycled.
    pub fn put(&self, key: CacheKey, resource: Arc<DecodedResource>) {
        let size = resource.byte_count();
        if size > self.max_size_bytes {
            debug!(
                key = %key,
                size,
                limit = self.max_size_bytes,
                "Resource larger than memory cache, not caching"
            );
            return;
        }

        let mut released = Vec::new();
        {
            let mut entries = self.entries.lock();
            if let Some(old) = entries.take(&key) {
                if !Arc::ptr_eq(&old, &resource) {
                    released.push(old);
                }
            }
            while entries.size_bytes + size > self.max_size_bytes {
                match Self::lru_key(&entries) {
                    Some(victim) => {
                        if let Some(evicted) = entries.take(&victim) {
                            self.evictions.fetch_add(1, Ordering::Relaxed);
                            debug!(key = %victim, bytes = evicted.byte_count(), "Memory cache eviction");
                            released.push(evicted);
                        }
                    }
                    None => break,
                }
            }
            entries.size_bytes += size;
            entries.map.insert(key, CacheEntry::new(resource));
        }

        // Recycle outside the cache lock; resources take their own lock.
        for resource in released {
            resource.recycle("memory cache eviction");
        }
    }

    /// Removes and recycles the resource stored under `key`.
    pub fn remove(&self, key: &CacheKey) -> Option<Arc<DecodedResource>> {
        let removed = self.entries.lock().take(key);
        if let Some(resource) = &removed {
            resource.recycle("memory cache remove");
        }
        removed
    }

    /// Evicts the entry under `key` only if its resource has been recycled.
    ///
    /// Used when a lookup finds a recycled resource; an entry that was
    /// replaced in the meantime is left alone.
    pub fn remove_recycled(&self, key: &CacheKey) -> bool {
        let mut entries = self.entries.lock();
        let recycled = entries
            .map
            .get(key)
            .is_some_and(|entry| entry.resource.is_recycled());
        if recycled {
            entries.take(key);
            warn!(key = %key, "Evicted recycled resource from memory cache");
        }
        recycled
    }

    /// Returns the edit lock handle for `key`.
    ///
    /// All current contenders for a key share the same lock.
    pub fn edit_lock(&self, key: &CacheKey) -> EditLock {
        self.edit_locks.get(key)
    }

    /// Number of keys that currently have a live edit lock handle.
    pub fn edit_lock_count(&self) -> usize {
        self.edit_locks.len()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().map.contains_key(key)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().map.len()
    }

    pub fn size_bytes(&self) -> usize {
        self.entries.lock().size_bytes
    }

    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }

    /// Removes and recycles every entry.
    pub fn clear(&self) {
        let drained: Vec<_> = {
            let mut entries = self.entries.lock();
            entries.size_bytes = 0;
            entries.map.drain().map(|(_, e)| e.resource).collect()
        };
        let count = drained.len();
        for resource in drained {
            resource.recycle("memory cache clear");
        }
        info!(entries = count, "Memory cache cleared");
    }

    pub fn stats(&self) -> MemoryCacheStats {
        let entries = self.entries.lock();
        MemoryCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entry_count: entries.map.len(),
            size_bytes: entries.size_bytes,
        }
    }

    fn lru_key(entries: &Entries) -> Option<CacheKey> {
        entries
            .map
            .iter()
            .min_by_key(|(_, e)| e.last_accessed)
            .map(|(k, _)| k.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::test_support::resource;

    fn key(s: &str) -> CacheKey {
        CacheKey::from(s)
    }

    #[test]
    fn test_memory_cache_new() {
        let cache = MemoryCache::new(1_000);
        assert_eq!(cache.max_size_bytes(), 1_000);
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.size_bytes(), 0);
    }

    #[test]
    fn test_put_then_get_returns_live_resource() {
        let cache = MemoryCache::new(1_000);
        let res = resource("imgA");
        cache.put(key("imgA"), Arc::clone(&res));

        let hit = cache.get(&key("imgA")).unwrap();
        assert!(Arc::ptr_eq(&hit, &res));
        assert!(!hit.is_recycled());
        assert_eq!(cache.size_bytes(), 16);
    }

    #[test]
    fn test_miss() {
        let cache = MemoryCache::new(1_000);
        assert!(cache.get(&key("imgA")).is_none());
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_remove_recycles() {
        let cache = MemoryCache::new(1_000);
        let res = resource("imgA");
        cache.put(key("imgA"), Arc::clone(&res));

        let removed = cache.remove(&key("imgA")).unwrap();
        assert!(Arc::ptr_eq(&removed, &res));
        assert!(res.is_recycled());
        assert!(res.is_reclaimed());
        assert!(!cache.contains(&key("imgA")));
        assert_eq!(cache.size_bytes(), 0);
    }

    #[test]
    fn test_eviction_defers_reclaim_while_referenced() {
        // Budget for exactly one 16-byte resource
        let cache = MemoryCache::new(16);
        let a = resource("imgA");
        cache.put(key("imgA"), Arc::clone(&a));
        let pending = a.try_acquire("display").unwrap();

        cache.put(key("imgB"), resource("imgB"));

        assert!(!cache.contains(&key("imgA")));
        assert!(a.is_recycled());
        assert!(!a.is_reclaimed(), "pending display keeps the buffer alive");
        drop(pending);
        assert!(a.is_reclaimed());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_lru_order() {
        let cache = MemoryCache::new(32);
        cache.put(key("imgA"), resource("imgA"));
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.put(key("imgB"), resource("imgB"));
        std::thread::sleep(std::time::Duration::from_millis(2));
        // Touch A so B becomes least recently used
        cache.get(&key("imgA"));
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.put(key("imgC"), resource("imgC"));

        assert!(cache.contains(&key("imgA")));
        assert!(!cache.contains(&key("imgB")));
        assert!(cache.contains(&key("imgC")));
    }

    #[test]
    fn test_oversized_resource_not_cached() {
        let cache = MemoryCache::new(8);
        let res = resource("imgA");
        cache.put(key("imgA"), Arc::clone(&res));
        assert!(!cache.contains(&key("imgA")));
        assert!(!res.is_recycled());
    }

    #[test]
    fn test_replacing_entry_recycles_old_resource() {
        let cache = MemoryCache::new(1_000);
        let old = resource("imgA");
        let new = resource("imgA");
        cache.put(key("imgA"), Arc::clone(&old));
        cache.put(key("imgA"), Arc::clone(&new));

        assert!(old.is_recycled());
        assert!(!new.is_recycled());
        assert_eq!(cache.entry_count(), 1);
        assert_eq!(cache.size_bytes(), 16);
    }

    #[test]
    fn test_reinserting_same_resource_keeps_it_live() {
        let cache = MemoryCache::new(1_000);
        let res = resource("imgA");
        cache.put(key("imgA"), Arc::clone(&res));
        cache.put(key("imgA"), Arc::clone(&res));
        assert!(!res.is_recycled());
        assert_eq!(cache.size_bytes(), 16);
    }

    #[test]
    fn test_clear_recycles_everything() {
        let cache = MemoryCache::new(1_000);
        let a = resource("imgA");
        let b = resource("imgB");
        cache.put(key("imgA"), Arc::clone(&a));
        cache.put(key("imgB"), Arc::clone(&b));

        cache.clear();
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.size_bytes(), 0);
        assert!(a.is_recycled() && b.is_recycled());
    }

    #[test]
    fn test_remove_recycled_only_evicts_recycled() {
        let cache = MemoryCache::new(1_000);
        let res = resource("imgB");
        cache.put(key("imgB"), Arc::clone(&res));
        assert!(!cache.remove_recycled(&key("imgB")));
        assert!(cache.contains(&key("imgB")));

        res.recycle("owner");
        assert!(cache.remove_recycled(&key("imgB")));
        assert!(!cache.contains(&key("imgB")));
        assert_eq!(cache.size_bytes(), 0);
    }

    #[test]
    fn test_edit_lock_is_per_key() {
        let cache = MemoryCache::new(1_000);
        let a1 = cache.edit_lock(&key("imgA"));
        let _a2 = cache.edit_lock(&key("imgA"));
        let _b = cache.edit_lock(&key("imgB"));
        assert_eq!(cache.edit_lock_count(), 2);
        assert_eq!(a1.key().as_str(), "imgA");
    }

    #[test]
    fn test_hit_rate() {
        let cache = MemoryCache::new(1_000);
        cache.put(key("imgA"), resource("imgA"));
        cache.get(&key("imgA"));
        cache.get(&key("imgA"));
        cache.get(&key("imgA"));
        cache.get(&key("missing"));
        assert!((cache.stats().hit_rate() - 0.75).abs() < 0.001);
    }
}
