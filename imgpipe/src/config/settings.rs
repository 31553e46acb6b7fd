//! Settings structs mirroring the sections of `config.ini`.

use std::path::PathBuf;
use std::time::Duration;

use super::pipeline::PipelineConfig;

/// User configuration loaded from `~/.imgpipe/config.ini`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub cache: CacheSettings,
    pub pipeline: PipelineSettings,
    pub network: NetworkSettings,
    pub logging: LoggingSettings,
}

/// `[cache]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Disk cache directory
    pub directory: PathBuf,
    /// Memory cache budget in bytes
    pub memory_size: usize,
    /// Disk cache budget in bytes
    pub disk_size: usize,
}

/// `[pipeline]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub download_concurrency: usize,
    pub decode_concurrency: usize,
    /// Serve only from cache; network requests are canceled
    pub pause_download: bool,
}

/// `[network]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    /// Per-request timeout in seconds
    pub timeout: u64,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}

impl ConfigFile {
    /// Converts file settings into the runtime pipeline configuration.
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            download_concurrency: self.pipeline.download_concurrency,
            decode_concurrency: self.pipeline.decode_concurrency,
            memory_cache_size: self.cache.memory_size,
            disk_cache_dir: Some(self.cache.directory.clone()),
            disk_cache_size: self.cache.disk_size,
            request_timeout: Duration::from_secs(self.network.timeout),
            pause_download: self.pipeline.pause_download,
        }
    }
}
