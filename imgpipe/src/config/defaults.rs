//! Default values for every configuration setting.

use std::path::PathBuf;

use super::settings::*;

/// Name of the per-user configuration directory under the home directory.
pub const CONFIG_DIR_NAME: &str = ".imgpipe";

pub const DEFAULT_MEMORY_CACHE_SIZE: usize = 64 * 1024 * 1024;
pub const DEFAULT_DISK_CACHE_SIZE: usize = 256 * 1024 * 1024;
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 8;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_LOG_FILE: &str = "imgpipe.log";

/// Number of available CPU cores.
pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Decoding is CPU-bound: one decode per core.
pub fn default_decode_concurrency() -> usize {
    num_cpus()
}

/// Platform cache directory, e.g. `~/.cache/imgpipe` on Linux.
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| super::file::config_directory().join("cache"))
        .join("imgpipe")
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            cache: CacheSettings {
                directory: default_cache_directory(),
                memory_size: DEFAULT_MEMORY_CACHE_SIZE,
                disk_size: DEFAULT_DISK_CACHE_SIZE,
            },
            pipeline: PipelineSettings {
                download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
                decode_concurrency: default_decode_concurrency(),
                pause_download: false,
            },
            network: NetworkSettings {
                timeout: DEFAULT_REQUEST_TIMEOUT_SECS,
            },
            logging: LoggingSettings {
                directory: PathBuf::from(DEFAULT_LOG_DIR),
                file: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }
}
