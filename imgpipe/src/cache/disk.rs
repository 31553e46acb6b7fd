//! Byte-level disk cache for downloaded resources.
//!
//! Entries hold the raw bytes of a resource exactly as downloaded, keyed by
//! its locator. File names are the hex blake3 digest of the key, so any
//! locator maps to a flat, filesystem-safe name. Writes go to a temporary
//! file first and are renamed into place, so a reader never sees a partial
//! entry.

use super::types::CacheError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::{debug, info, warn};

const TEMP_SUFFIX: &str = ".tmp";

/// Handle to a stored disk cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskCacheEntry {
    key: String,
    path: PathBuf,
    size: u64,
}

impl DiskCacheEntry {
    pub fn new(key: impl Into<String>, path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
            size,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Reads the entry's bytes. Blocks on I/O.
    pub fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }
}

/// Persistent byte cache consulted by dispatch and written by downloads.
///
/// All methods may block on I/O and are only called from blocking workers.
pub trait DiskCache: Send + Sync {
    /// Looks up an entry by locator.
    fn get(&self, key: &str) -> Option<DiskCacheEntry>;

    /// Stores `data` under `key`, replacing any existing entry.
    fn put(&self, key: &str, data: &[u8]) -> Result<DiskCacheEntry, CacheError>;

    /// Removes an entry. Returns true if one existed.
    fn remove(&self, key: &str) -> bool;
}

/// Disk cache that stores nothing.
///
/// Used when disk caching is disabled for the whole pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpDiskCache;

impl DiskCache for NoOpDiskCache {
    fn get(&self, _key: &str) -> Option<DiskCacheEntry> {
        None
    }

    fn put(&self, key: &str, _data: &[u8]) -> Result<DiskCacheEntry, CacheError> {
        Err(CacheError::InvalidConfig(format!(
            "disk cache disabled, cannot store '{}'",
            key
        )))
    }

    fn remove(&self, _key: &str) -> bool {
        false
    }
}

/// Disk cache statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiskCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
    pub entry_count: usize,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

#[derive(Default)]
struct Index {
    entries: HashMap<String, IndexEntry>,
    size_bytes: u64,
}

/// File-backed disk cache with a size budget.
pub struct FileDiskCache {
    cache_dir: PathBuf,
    max_size_bytes: u64,
    /// Digest name -> entry
    index: Mutex<Index>,
    temp_counter: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
}

impl FileDiskCache {
    /// Opens (creating if needed) a cache rooted at `cache_dir`.
    ///
    /// Existing entries are indexed, stale temporary files are removed, and
    /// the cache is trimmed if it is already over budget.
    pub fn new(cache_dir: impl Into<PathBuf>, max_size_bytes: u64) -> Result<Self, CacheError> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;

        let cache = Self {
            cache_dir,
            max_size_bytes,
            index: Mutex::new(Index::default()),
            temp_counter: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        };
        cache.scan()?;
        cache.trim()?;

        let stats = cache.stats();
        info!(
            dir = %cache.cache_dir.display(),
            entries = stats.entry_count,
            bytes = stats.size_bytes,
            "Disk cache opened"
        );
        Ok(cache)
    }

    /// File name for a key.
    pub fn entry_name(key: &str) -> String {
        blake3::hash(key.as_bytes()).to_hex().to_string()
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn stats(&self) -> DiskCacheStats {
        let index = self.index.lock();
        DiskCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entry_count: index.entries.len(),
            size_bytes: index.size_bytes,
        }
    }

    /// Removes every entry.
    pub fn clear(&self) -> Result<(), CacheError> {
        let drained: Vec<_> = {
            let mut index = self.index.lock();
            index.size_bytes = 0;
            index.entries.drain().map(|(_, e)| e.path).collect()
        };
        for path in drained {
            remove_file_if_exists(&path)?;
        }
        Ok(())
    }

    /// Evicts the oldest entries until the cache fits its budget.
    pub fn trim(&self) -> Result<usize, CacheError> {
        let victims = {
            let mut index = self.index.lock();
            if index.size_bytes <= self.max_size_bytes {
                return Ok(0);
            }

            let mut by_age: Vec<_> = index
                .entries
                .iter()
                .map(|(name, e)| (e.modified, name.clone()))
                .collect();
            by_age.sort();

            let mut victims = Vec::new();
            for (_, name) in by_age {
                if index.size_bytes <= self.max_size_bytes {
                    break;
                }
                if let Some(entry) = index.entries.remove(&name) {
                    index.size_bytes = index.size_bytes.saturating_sub(entry.size);
                    victims.push(entry.path);
                }
            }
            victims
        };

        for path in &victims {
            remove_file_if_exists(path)?;
        }
        if !victims.is_empty() {
            self.evictions
                .fetch_add(victims.len() as u64, Ordering::Relaxed);
            debug!(evicted = victims.len(), "Disk cache trimmed");
        }
        Ok(victims.len())
    }

    fn scan(&self) -> Result<(), CacheError> {
        let mut index = self.index.lock();
        for dir_entry in fs::read_dir(&self.cache_dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            let metadata = dir_entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.contains(TEMP_SUFFIX) {
                // Interrupted write from a previous run
                remove_file_if_exists(&path)?;
                continue;
            }
            let name = name.to_string();
            let size = metadata.len();
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            index.size_bytes += size;
            index.entries.insert(
                name,
                IndexEntry {
                    path,
                    size,
                    modified,
                },
            );
        }
        Ok(())
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        self.cache_dir
            .join(format!("{}{}-{}-{}", name, TEMP_SUFFIX, std::process::id(), n))
    }
}

impl DiskCache for FileDiskCache {
    fn get(&self, key: &str) -> Option<DiskCacheEntry> {
        let name = Self::entry_name(key);
        let found = self.index.lock().entries.get(&name).cloned();

        match found {
            Some(entry) if entry.path.is_file() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(DiskCacheEntry::new(key, entry.path, entry.size))
            }
            Some(_) => {
                // Deleted behind our back
                let mut index = self.index.lock();
                if let Some(stale) = index.entries.remove(&name) {
                    index.size_bytes = index.size_bytes.saturating_sub(stale.size);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<DiskCacheEntry, CacheError> {
        let size = data.len() as u64;
        if size > self.max_size_bytes {
            return Err(CacheError::EntryTooLarge {
                size: data.len(),
                limit: self.max_size_bytes as usize,
            });
        }

        let name = Self::entry_name(key);
        let path = self.cache_dir.join(&name);
        let temp = self.temp_path(&name);
        if let Err(e) = fs::write(&temp, data).and_then(|_| fs::rename(&temp, &path)) {
            warn!(key, error = %e, "Disk cache write failed");
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        {
            let mut index = self.index.lock();
            if let Some(old) = index.entries.remove(&name) {
                index.size_bytes = index.size_bytes.saturating_sub(old.size);
            }
            index.size_bytes += size;
            index.entries.insert(
                name,
                IndexEntry {
                    path: path.clone(),
                    size,
                    modified: SystemTime::now(),
                },
            );
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!(key, bytes = size, "Disk cache write");

        self.trim()?;
        Ok(DiskCacheEntry::new(key, path, size))
    }

    fn remove(&self, key: &str) -> bool {
        let name = Self::entry_name(key);
        let removed = {
            let mut index = self.index.lock();
            let removed = index.entries.remove(&name);
            if let Some(entry) = &removed {
                index.size_bytes = index.size_bytes.saturating_sub(entry.size);
            }
            removed
        };
        match removed {
            Some(entry) => {
                if let Err(e) = remove_file_if_exists(&entry.path) {
                    warn!(key, error = %e, "Failed to delete disk cache entry");
                }
                true
            }
            None => false,
        }
    }
}

fn remove_file_if_exists(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
