//! Runtime configuration for an image pipeline.

use std::path::PathBuf;
use std::time::Duration;

use super::defaults::*;
use crate::cache::{DiskCacheConfig, MemoryCacheConfig};

/// Runtime settings consumed by [`ImagePipeline`](crate::service::ImagePipeline).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Concurrent download stages across all requests
    pub download_concurrency: usize,
    /// Concurrent load (decode) stages across all requests
    pub decode_concurrency: usize,
    /// Memory cache budget in bytes
    pub memory_cache_size: usize,
    /// Disk cache directory; `None` disables the disk cache
    pub disk_cache_dir: Option<PathBuf>,
    /// Disk cache budget in bytes
    pub disk_cache_size: usize,
    /// HTTP timeout per request
    pub request_timeout: Duration,
    /// Map every network-allowed request to local-only
    pub pause_download: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            decode_concurrency: default_decode_concurrency(),
            memory_cache_size: DEFAULT_MEMORY_CACHE_SIZE,
            disk_cache_dir: Some(default_cache_directory()),
            disk_cache_size: DEFAULT_DISK_CACHE_SIZE,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            pause_download: false,
        }
    }
}

impl PipelineConfig {
    pub fn with_download_concurrency(mut self, n: usize) -> Self {
        self.download_concurrency = n;
        self
    }

    pub fn with_decode_concurrency(mut self, n: usize) -> Self {
        self.decode_concurrency = n;
        self
    }

    pub fn with_memory_cache_size(mut self, bytes: usize) -> Self {
        self.memory_cache_size = bytes;
        self
    }

    pub fn with_disk_cache(mut self, dir: impl Into<PathBuf>, bytes: usize) -> Self {
        self.disk_cache_dir = Some(dir.into());
        self.disk_cache_size = bytes;
        self
    }

    pub fn without_disk_cache(mut self) -> Self {
        self.disk_cache_dir = None;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_pause_download(mut self, paused: bool) -> Self {
        self.pause_download = paused;
        self
    }

    pub fn memory_cache_config(&self) -> MemoryCacheConfig {
        MemoryCacheConfig {
            max_size_bytes: self.memory_cache_size,
        }
    }

    /// Disk cache settings, or `None` when the disk cache is disabled.
    pub fn disk_cache_config(&self) -> Option<DiskCacheConfig> {
        self.disk_cache_dir
            .as_ref()
            .map(|dir| DiskCacheConfig::new(dir).with_max_size(self.disk_cache_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.download_concurrency, 8);
        assert_eq!(config.decode_concurrency, num_cpus());
        assert_eq!(config.memory_cache_size, 64 * 1024 * 1024);
        assert_eq!(config.disk_cache_size, 256 * 1024 * 1024);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(!config.pause_download);
    }

    #[test]
    fn test_disk_cache_toggle() {
        let config = PipelineConfig::default().with_disk_cache("/tmp/imgpipe-test", 1024);
        let disk = config.disk_cache_config().unwrap();
        assert_eq!(disk.cache_dir, PathBuf::from("/tmp/imgpipe-test"));
        assert_eq!(disk.max_size_bytes, 1024);

        assert!(config.without_disk_cache().disk_cache_config().is_none());
    }
}
