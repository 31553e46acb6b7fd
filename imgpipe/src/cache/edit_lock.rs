//! Per-key edit locks for the memory cache.
//!
//! Requests for the same [`CacheKey`] must not decode concurrently. Before
//! consulting the memory cache a request obtains the key's [`EditLock`] and
//! holds its guard across "check cache, else decode, else insert":
//!
//! ```text
//! request A ── edit_lock(k) ── lock ──► check ─► decode ─► put ──► unlock
//! request B ── edit_lock(k) ── lock ···························· ──► check (hit) ─► unlock
//! request C ── edit_lock(j) ── lock ──► check ─► decode ─► put ──► unlock   (other key, runs in parallel)
//! ```
//!
//! # Implementation
//!
//! Locks are created lazily in a `DashMap` and shared by every current
//! contender for the key. The entry API makes get-or-create atomic per
//! shard, so two distinct locks never exist for the same key at once.
//! When the last handle for a key is dropped the entry is removed; the
//! removal runs under the same shard lock and only fires when the map holds
//! the sole remaining clone.

use crate::identity::CacheKey;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tracing::trace;

type LockMap = DashMap<CacheKey, Arc<Mutex<()>>>;

/// Registry of per-key edit locks.
#[derive(Default)]
pub(crate) struct EditLocks {
    locks: Arc<LockMap>,
}

impl EditLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the shared lock handle for `key`, creating it if needed.
    pub(crate) fn get(&self, key: &CacheKey) -> EditLock {
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        EditLock {
            key: key.clone(),
            lock,
            registry: Arc::clone(&self.locks),
        }
    }

    /// Number of keys with at least one live handle.
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Handle to the edit lock for one key.
///
/// Call [`EditLock::lock`] to enter the critical section; the returned guard
/// releases the lock when dropped, on every exit path.
pub struct EditLock {
    key: CacheKey,
    lock: Arc<Mutex<()>>,
    registry: Arc<LockMap>,
}

impl EditLock {
    /// Blocks until the lock for this key is held.
    pub fn lock(&self) -> EditLockGuard<'_> {
        if let Some(guard) = self.lock.try_lock() {
            return EditLockGuard {
                key: &self.key,
                _guard: guard,
            };
        }
        trace!(key = %self.key, "Edit lock contended, waiting");
        EditLockGuard {
            key: &self.key,
            _guard: self.lock.lock(),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl Drop for EditLock {
    fn drop(&mut self) {
        // Two strong refs means only this handle and the registry remain.
        self.registry
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 2);
    }
}

/// Held edit lock. Dropping it releases the lock.
pub struct EditLockGuard<'a> {
    key: &'a CacheKey,
    _guard: MutexGuard<'a, ()>,
}

impl EditLockGuard<'_> {
    pub fn key(&self) -> &CacheKey {
        self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_same_key_shares_lock() {
        let locks = EditLocks::new();
        let a = locks.get(&CacheKey::from("imgA"));
        let b = locks.get(&CacheKey::from("imgA"));
        assert!(Arc::ptr_eq(&a.lock, &b.lock));
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_different_keys_get_different_locks() {
        let locks = EditLocks::new();
        let a = locks.get(&CacheKey::from("imgA"));
        let b = locks.get(&CacheKey::from("imgB"));
        assert!(!Arc::ptr_eq(&a.lock, &b.lock));
        assert_eq!(locks.len(), 2);

        let _ga = a.lock();
        // Different key is not blocked
        let gb = b.lock();
        assert_eq!(gb.key().as_str(), "imgB");
    }

    #[test]
    fn test_registry_entry_removed_after_last_handle() {
        let locks = EditLocks::new();
        let a = locks.get(&CacheKey::from("imgA"));
        let b = locks.get(&CacheKey::from("imgA"));
        drop(a);
        assert_eq!(locks.len(), 1, "entry must survive while a handle remains");
        drop(b);
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn test_guard_released_on_early_return() {
        fn critical(lock: &EditLock, bail: bool) -> bool {
            let _guard = lock.lock();
            if bail {
                return false;
            }
            true
        }

        let locks = EditLocks::new();
        let lock = locks.get(&CacheKey::from("imgA"));
        assert!(!critical(&lock, true));
        // Would deadlock if the early return leaked the guard
        assert!(critical(&lock, false));
    }

    #[test]
    fn test_lock_serializes_same_key() {
        let locks = Arc::new(EditLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                std::thread::spawn(move || {
                    let lock = locks.get(&CacheKey::from("imgA"));
                    let _guard = lock.lock();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 0);
    }
}
