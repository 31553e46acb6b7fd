//! Pipeline context containing shared collaborators.
//!
//! The `PipelineContext` is the explicit replacement for process-wide
//! configuration: every stage receives the caches and the download/decode
//! collaborators through it.

use super::error::{DecodeError, DownloadError};
use crate::cache::{DiskCache, MemoryCache};
use crate::identity::TransformOptions;
use crate::request::{DataSource, DownloadResult};
use crate::resource::Decoded;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Inputs for a single download.
pub struct DownloadTask<'a> {
    pub uri: &'a str,
    /// Key to store the bytes under when write-through is requested.
    pub disk_key: &'a str,
    /// Set when the bytes should be written through to the disk cache.
    pub disk_cache: Option<&'a dyn DiskCache>,
    /// Polled between chunks; a cancelled token abandons the transfer.
    pub cancel: &'a CancellationToken,
    /// Receives `(total, completed)` byte counts. `total` is zero if unknown.
    pub progress: &'a (dyn Fn(u64, u64) + Send + Sync),
}

impl DownloadTask<'_> {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn report_progress(&self, total: u64, completed: u64) {
        (self.progress)(total, completed);
    }
}

/// Fetches the bytes behind a locator. Blocking.
pub trait Downloader: Send + Sync + 'static {
    /// Returns either a disk cache entry or in-memory bytes.
    fn download(&self, task: &DownloadTask<'_>) -> Result<DownloadResult, DownloadError>;
}

/// Turns downloaded bytes into pixels. Blocking and CPU-bound.
pub trait Decoder: Send + Sync + 'static {
    fn decode(
        &self,
        source: &DataSource,
        transform: &TransformOptions,
    ) -> Result<Decoded, DecodeError>;
}

/// Shared context for pipeline stages.
///
/// Cheap to clone; every field is behind an `Arc`.
#[derive(Clone)]
pub struct PipelineContext {
    pub disk_cache: Arc<dyn DiskCache>,
    pub memory_cache: Arc<MemoryCache>,
    pub downloader: Arc<dyn Downloader>,
    pub decoder: Arc<dyn Decoder>,
}

impl PipelineContext {
    pub fn new(
        disk_cache: Arc<dyn DiskCache>,
        memory_cache: Arc<MemoryCache>,
        downloader: Arc<dyn Downloader>,
        decoder: Arc<dyn Decoder>,
    ) -> Self {
        Self {
            disk_cache,
            memory_cache,
            downloader,
            decoder,
        }
    }
}
