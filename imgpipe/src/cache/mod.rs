//! Two-tier cache for image resources.
//!
//! The disk tier stores downloaded bytes keyed by locator; the memory tier
//! stores decoded resources keyed by the derived cache key and owns the
//! per-key edit locks that serialize decode.

mod disk;
mod edit_lock;
mod memory;
mod types;

pub use disk::{DiskCache, DiskCacheEntry, DiskCacheStats, FileDiskCache, NoOpDiskCache};
pub use edit_lock::{EditLock, EditLockGuard};
pub use memory::{MemoryCache, MemoryCacheStats};
pub use types::{CacheError, DiskCacheConfig, MemoryCacheConfig};
