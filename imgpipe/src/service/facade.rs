//! The `ImagePipeline` facade.

use super::builder::ImagePipelineBuilder;
use super::error::ServiceError;
use super::handle::RequestHandle;
use crate::cache::{DiskCache, MemoryCache};
use crate::config::PipelineConfig;
use crate::pipeline::{BlockingExecutor, ConsumerHandle, Dispatcher, TokioExecutor};
use crate::request::{Listener, Options, PipelineKind, Request, Target};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Loads, caches and delivers images.
///
/// # Example
///
/// ```ignore
/// use imgpipe::config::PipelineConfig;
/// use imgpipe::request::Options;
/// use imgpipe::service::ImagePipeline;
///
/// let pipeline = ImagePipeline::new(PipelineConfig::default())?;
/// let handle = pipeline.display("https://img.example/a.png", Options::default(), target, None);
/// println!("{}", handle.wait().await);
/// ```
pub struct ImagePipeline<E: BlockingExecutor = TokioExecutor> {
    dispatcher: Arc<Dispatcher<E>>,
    consumer: ConsumerHandle,
    config: PipelineConfig,
    pause_download: AtomicBool,
}

impl ImagePipeline<TokioExecutor> {
    /// Builds a pipeline with the production collaborators. Must be called
    /// from within a Tokio runtime.
    pub fn new(config: PipelineConfig) -> Result<Self, ServiceError> {
        ImagePipelineBuilder::new(config).build()
    }

    pub fn builder(config: PipelineConfig) -> ImagePipelineBuilder<TokioExecutor> {
        ImagePipelineBuilder::new(config)
    }
}

impl<E: BlockingExecutor> ImagePipeline<E> {
    pub(super) fn from_parts(
        dispatcher: Arc<Dispatcher<E>>,
        consumer: ConsumerHandle,
        config: PipelineConfig,
    ) -> Self {
        let pause_download = AtomicBool::new(config.pause_download);
        Self {
            dispatcher,
            consumer,
            config,
            pause_download,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn memory_cache(&self) -> &Arc<MemoryCache> {
        &self.dispatcher.context().memory_cache
    }

    pub fn disk_cache(&self) -> &Arc<dyn DiskCache> {
        &self.dispatcher.context().disk_cache
    }

    pub fn active_requests(&self) -> usize {
        self.dispatcher.active_requests()
    }

    /// Pauses or resumes downloads for requests submitted from now on.
    pub fn set_pause_download(&self, paused: bool) {
        let was = self.pause_download.swap(paused, Ordering::Relaxed);
        if was != paused {
            info!(paused, "Download pause changed");
        }
    }

    pub fn is_download_paused(&self) -> bool {
        self.pause_download.load(Ordering::Relaxed)
    }

    /// Creates a request bound to this pipeline's consumer context.
    ///
    /// Attach a listener or target, then pass it to [`ImagePipeline::submit`].
    /// The download pause is applied here, at creation.
    pub fn request(&self, kind: PipelineKind, uri: impl Into<String>, options: Options) -> Request {
        let options = if self.is_download_paused() {
            options.paused()
        } else {
            options
        };
        Request::new(kind, uri, options, self.consumer.clone())
    }

    /// Submits a request built with [`ImagePipeline::request`].
    pub fn submit(&self, request: Request) -> RequestHandle {
        let request = Arc::new(request);
        self.dispatcher.submit(Arc::clone(&request));
        RequestHandle::new(request)
    }

    /// Loads, caches and displays `uri` on `target`.
    pub fn display(
        &self,
        uri: impl Into<String>,
        options: Options,
        target: Arc<dyn Target>,
        listener: Option<Arc<dyn Listener>>,
    ) -> RequestHandle {
        let request = self
            .request(PipelineKind::Display, uri, options)
            .with_target(target);
        self.submit(with_listener(request, listener))
    }

    /// Downloads and decodes `uri` without touching the memory cache.
    pub fn load(
        &self,
        uri: impl Into<String>,
        options: Options,
        listener: Option<Arc<dyn Listener>>,
    ) -> RequestHandle {
        let request = self.request(PipelineKind::Load, uri, options);
        self.submit(with_listener(request, listener))
    }

    /// Downloads `uri` (into the disk cache when enabled) without decoding.
    pub fn download(
        &self,
        uri: impl Into<String>,
        options: Options,
        listener: Option<Arc<dyn Listener>>,
    ) -> RequestHandle {
        let request = self.request(PipelineKind::Download, uri, options);
        self.submit(with_listener(request, listener))
    }
}

fn with_listener(request: Request, listener: Option<Arc<dyn Listener>>) -> Request {
    match listener {
        Some(listener) => request.with_listener(listener),
        None => request,
    }
}
