//! Builder wiring the collaborators of an [`ImagePipeline`].
//!
//! Every collaborator has a production default derived from the
//! [`PipelineConfig`]; tests and embedders swap in their own.

use super::error::ServiceError;
use super::facade::ImagePipeline;
use crate::adapters::{HttpDownloader, ImageDecoder};
use crate::cache::{DiskCache, FileDiskCache, MemoryCache, NoOpDiskCache};
use crate::config::PipelineConfig;
use crate::pipeline::{
    consumer_channel, BlockingExecutor, ConsumerQueue, Decoder, Dispatcher, Downloader,
    PipelineContext, TokioExecutor,
};
use std::sync::Arc;
use tracing::info;

/// Builds an [`ImagePipeline`].
pub struct ImagePipelineBuilder<E: BlockingExecutor = TokioExecutor> {
    config: PipelineConfig,
    executor: E,
    disk_cache: Option<Arc<dyn DiskCache>>,
    memory_cache: Option<Arc<MemoryCache>>,
    downloader: Option<Arc<dyn Downloader>>,
    decoder: Option<Arc<dyn Decoder>>,
}

impl ImagePipelineBuilder<TokioExecutor> {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            executor: TokioExecutor::new(),
            disk_cache: None,
            memory_cache: None,
            downloader: None,
            decoder: None,
        }
    }
}

impl<E: BlockingExecutor> ImagePipelineBuilder<E> {
    /// Runs stages on `executor` instead of Tokio's blocking pool.
    pub fn executor<E2: BlockingExecutor>(self, executor: E2) -> ImagePipelineBuilder<E2> {
        ImagePipelineBuilder {
            config: self.config,
            executor,
            disk_cache: self.disk_cache,
            memory_cache: self.memory_cache,
            downloader: self.downloader,
            decoder: self.decoder,
        }
    }

    pub fn disk_cache(mut self, disk_cache: Arc<dyn DiskCache>) -> Self {
        self.disk_cache = Some(disk_cache);
        self
    }

    pub fn memory_cache(mut self, memory_cache: Arc<MemoryCache>) -> Self {
        self.memory_cache = Some(memory_cache);
        self
    }

    pub fn downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Builds the pipeline and spawns its consumer context on the current
    /// Tokio runtime.
    pub fn build(self) -> Result<ImagePipeline<E>, ServiceError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| ServiceError::RuntimeError(e.to_string()))?;
        let (pipeline, queue) = self.build_with_queue()?;
        handle.spawn(queue.run());
        Ok(pipeline)
    }

    /// Builds the pipeline and returns its consumer queue for the caller to
    /// drive, e.g. from a UI loop with [`ConsumerQueue::run_pending`].
    pub fn build_with_queue(self) -> Result<(ImagePipeline<E>, ConsumerQueue), ServiceError> {
        let config = self.config;
        if config.memory_cache_size == 0 {
            return Err(ServiceError::ConfigError(
                "memory cache size must be greater than zero".to_string(),
            ));
        }

        let disk_cache = match self.disk_cache {
            Some(disk_cache) => disk_cache,
            None => create_disk_cache(&config)?,
        };
        let memory_cache = self
            .memory_cache
            .unwrap_or_else(|| Arc::new(MemoryCache::new(config.memory_cache_config().max_size_bytes)));
        let downloader = self
            .downloader
            .unwrap_or_else(|| Arc::new(HttpDownloader::new(config.request_timeout)));
        let decoder = self.decoder.unwrap_or_else(|| Arc::new(ImageDecoder::new()));

        let ctx = PipelineContext::new(disk_cache, memory_cache, downloader, decoder);
        let dispatcher = Dispatcher::new(
            ctx,
            self.executor,
            config.download_concurrency,
            config.decode_concurrency,
        );
        let (consumer, queue) = consumer_channel();

        info!(
            download_concurrency = config.download_concurrency,
            decode_concurrency = config.decode_concurrency,
            memory_cache_size = config.memory_cache_size,
            disk_cache = ?config.disk_cache_dir,
            pause_download = config.pause_download,
            "Image pipeline ready"
        );
        Ok((ImagePipeline::from_parts(dispatcher, consumer, config), queue))
    }
}

fn create_disk_cache(config: &PipelineConfig) -> Result<Arc<dyn DiskCache>, ServiceError> {
    match config.disk_cache_config() {
        Some(disk) => {
            let cache = FileDiskCache::new(disk.cache_dir, disk.max_size_bytes as u64)?;
            Ok(Arc::new(cache))
        }
        None => Ok(Arc::new(NoOpDiskCache)),
    }
}
