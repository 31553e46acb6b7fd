//! Stage functions of the request state machine.
//!
//! Each function runs one stage of one request on a blocking worker and
//! returns the next stage to schedule, or [`StageOutcome::Done`] once the
//! request has reached (or scheduled) a terminal transition.
//!
//! ```text
//! Dispatch ──► Download ──► Load ──► Display
//!    │  │                    ▲  ▲        ▲
//!    │  └── disk hit / local ┘  │        │
//!    └────── memory hit (display requests) ──┘
//! ```
//!
//! Cancellation is checked at the entry of every stage and right after the
//! download and decode collaborators return. A stage that observes
//! cancellation commits no further side effects; the edit lock and any
//! resource reference it holds are released on the way out.

use super::context::{DownloadTask, PipelineContext};
use crate::identity::UriKind;
use crate::request::{
    CancelCause, DownloadResult, FailedCause, ImageFrom, LoadResult, PipelineKind, Request,
    RequestLevelFrom, Status,
};
use crate::resource::{DecodedResource, ResourceRef};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A decoded resource on its way to the consumer, with its pending-display
/// reference already taken.
pub(crate) struct PendingDisplay {
    pub(crate) result: LoadResult,
    pub(crate) held: ResourceRef,
}

impl PendingDisplay {
    /// Takes the pending-display reference. `None` if the resource was
    /// recycled in the meantime.
    fn acquire(resource: Arc<DecodedResource>, from: ImageFrom, caller: &'static str) -> Option<Self> {
        let held = resource.try_acquire(caller)?;
        Some(Self {
            result: LoadResult::new(resource, from),
            held,
        })
    }
}

/// The next unit of work for a request.
pub(crate) enum Stage {
    Dispatch,
    Download,
    Load(DownloadResult),
    Display(PendingDisplay),
}

impl Stage {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Stage::Dispatch => "dispatch",
            Stage::Download => "download",
            Stage::Load(_) => "load",
            Stage::Display(_) => "display",
        }
    }
}

pub(crate) enum StageOutcome {
    Next(Stage),
    Done,
}

/// Runs one stage.
pub(crate) fn run(ctx: &PipelineContext, request: &Arc<Request>, stage: Stage) -> StageOutcome {
    match stage {
        Stage::Dispatch => dispatch(ctx, request),
        Stage::Download => download(ctx, request),
        Stage::Load(downloaded) => load(ctx, request, downloaded),
        Stage::Display(pending) => display(request, pending),
    }
}

#[instrument(skip_all, fields(request_id = %request.id(), key = %request.key()))]
fn dispatch(ctx: &PipelineContext, request: &Arc<Request>) -> StageOutcome {
    if request.is_canceled() {
        return StageOutcome::Done;
    }
    request.set_status(Status::Dispatching);

    let options = request.options();
    let attrs = request.attrs();

    match attrs.uri_kind() {
        UriKind::Invalid => {
            request.failed(FailedCause::UriInvalid);
            return StageOutcome::Done;
        }
        UriKind::LocalFile(path) => {
            debug!(path = %path.display(), "Local file, skipping download");
            return to_load_or_complete(request, DownloadResult::from_local(path));
        }
        UriKind::Network => {}
    }

    if request.kind() == PipelineKind::Display && options.cache_in_memory {
        let key = request.key();
        if let Some(cached) = ctx.memory_cache.get(key) {
            match PendingDisplay::acquire(cached, ImageFrom::MemoryCache, "dispatch memory hit") {
                Some(pending) => {
                    debug!("Memory cache hit at dispatch");
                    request.set_status(Status::WaitDisplay);
                    return StageOutcome::Next(Stage::Display(pending));
                }
                None => {
                    ctx.memory_cache.remove_recycled(key);
                }
            }
        }
    }

    if options.cache_in_disk {
        if let Some(entry) = ctx.disk_cache.get(attrs.disk_cache_key()) {
            debug!(path = %entry.path().display(), "Disk cache hit");
            return to_load_or_complete(request, DownloadResult::from_disk(entry));
        }
    }

    if options.is_local_only() {
        let cause = match options.request_level_from {
            RequestLevelFrom::PauseDownload => CancelCause::PauseDownload,
            RequestLevelFrom::Normal => CancelCause::LevelIsLocal,
        };
        request.canceled(cause);
        return StageOutcome::Done;
    }

    request.set_status(Status::WaitDownload);
    StageOutcome::Next(Stage::Download)
}

#[instrument(skip_all, fields(request_id = %request.id(), key = %request.key()))]
fn download(ctx: &PipelineContext, request: &Arc<Request>) -> StageOutcome {
    if request.is_canceled() {
        return StageOutcome::Done;
    }
    request.set_status(Status::Downloading);

    let options = request.options();
    let progress_request = Arc::clone(request);
    let progress = move |total: u64, completed: u64| {
        progress_request.update_progress(total, completed);
    };
    let task = DownloadTask {
        uri: request.attrs().uri(),
        disk_key: request.attrs().disk_cache_key(),
        disk_cache: options.cache_in_disk.then(|| &*ctx.disk_cache),
        cancel: request.cancellation_token(),
        progress: &progress,
    };

    let result = ctx.downloader.download(&task);

    if request.is_canceled() {
        debug!("Canceled during download");
        return StageOutcome::Done;
    }

    match result {
        Ok(downloaded) if !downloaded.is_empty() => {
            debug!(from = %downloaded.from, "Download complete");
            to_load_or_complete(request, downloaded)
        }
        Ok(_) => {
            warn!("Download returned no data");
            request.failed(FailedCause::DownloadFail);
            StageOutcome::Done
        }
        Err(e) => {
            warn!(error = %e, "Download failed");
            request.failed(FailedCause::DownloadFail);
            StageOutcome::Done
        }
    }
}

#[instrument(skip_all, fields(request_id = %request.id(), key = %request.key()))]
fn load(ctx: &PipelineContext, request: &Arc<Request>, downloaded: DownloadResult) -> StageOutcome {
    if request.is_canceled() {
        return StageOutcome::Done;
    }

    let key = request.key();
    if !request.options().cache_in_memory || key.is_empty() {
        request.set_status(Status::Loading);
        return decode(ctx, request, &downloaded, false);
    }

    // Every decode of a memory-cacheable key runs under its edit lock, so at
    // most one decode per key is in flight across all pipeline kinds.
    request.set_status(Status::GetMemoryCacheEditLock);
    let edit_lock = ctx.memory_cache.edit_lock(key);
    let _guard = edit_lock.lock();

    if request.is_canceled() {
        debug!("Canceled while waiting for edit lock");
        return StageOutcome::Done;
    }

    // Only display requests read and fill the memory cache
    let use_memory_cache = request.kind() == PipelineKind::Display;
    if use_memory_cache {
        request.set_status(Status::CheckMemoryCache);
        if let Some(cached) = ctx.memory_cache.get(key) {
            match PendingDisplay::acquire(cached, ImageFrom::MemoryCache, "load memory hit") {
                Some(pending) => {
                    debug!("Memory cache hit");
                    request.set_status(Status::WaitDisplay);
                    return StageOutcome::Next(Stage::Display(pending));
                }
                None => {
                    ctx.memory_cache.remove_recycled(key);
                }
            }
        }
    }

    request.set_status(Status::Loading);
    decode(ctx, request, &downloaded, use_memory_cache)
}

/// Decodes, wraps and optionally caches. Runs inside the edit lock whenever
/// the request allows memory caching.
fn decode(
    ctx: &PipelineContext,
    request: &Arc<Request>,
    downloaded: &DownloadResult,
    cache_in_memory: bool,
) -> StageOutcome {
    let decoded = match ctx
        .decoder
        .decode(&downloaded.source, &request.options().transform)
    {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(error = %e, "Decode failed");
            request.failed(FailedCause::DecodeFail);
            return StageOutcome::Done;
        }
    };

    let key = request.key();
    let held = DecodedResource::new_held(key.clone(), decoded, downloaded.from, "load");
    let resource = Arc::clone(held.resource());

    if request.is_canceled() {
        debug!("Canceled during decode, discarding resource");
        resource.recycle("canceled after decode");
        return StageOutcome::Done;
    }

    if cache_in_memory {
        if resource.is_animated() {
            debug!("Animated resource, not caching in memory");
        } else {
            ctx.memory_cache.put(key.clone(), Arc::clone(&resource));
        }
    }

    let pending = PendingDisplay {
        result: LoadResult::new(resource, downloaded.from),
        held,
    };
    debug!(
        mime_type = pending.result.mime_type(),
        width = pending.result.origin_width(),
        height = pending.result.origin_height(),
        "Decoded"
    );
    request.set_status(Status::WaitDisplay);
    StageOutcome::Next(Stage::Display(pending))
}

#[instrument(skip_all, fields(request_id = %request.id(), key = %request.key()))]
fn display(request: &Arc<Request>, pending: PendingDisplay) -> StageOutcome {
    if request.is_canceled() {
        debug!("Canceled before display");
        return StageOutcome::Done;
    }
    let PendingDisplay { result, held } = pending;
    request.post_completed(result.from, result.mime_type().to_string(), Some(held));
    StageOutcome::Done
}

/// Download requests complete with the bytes; everything else decodes them.
fn to_load_or_complete(request: &Arc<Request>, downloaded: DownloadResult) -> StageOutcome {
    if request.kind() == PipelineKind::Download {
        let mime_type = downloaded
            .content_type
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        request.set_status(Status::WaitDisplay);
        request.post_completed(downloaded.from, mime_type, None);
        return StageOutcome::Done;
    }
    request.set_status(Status::WaitLoad);
    StageOutcome::Next(Stage::Load(downloaded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DiskCache, FileDiskCache, MemoryCache, NoOpDiskCache};
    use crate::identity::TransformOptions;
    use crate::pipeline::context::{Decoder, Downloader};
    use crate::pipeline::error::{DecodeError, DownloadError};
    use crate::pipeline::{consumer_channel, ConsumerQueue};
    use crate::request::{DataSource, Options, RequestLevel, RequestOutcome};
    use crate::resource::test_support::{decoded, resource};
    use crate::resource::Decoded;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct StubDownloader {
        calls: AtomicUsize,
        empty: bool,
    }

    impl Downloader for StubDownloader {
        fn download(&self, task: &DownloadTask<'_>) -> Result<DownloadResult, DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            task.report_progress(4, 4);
            if self.empty {
                return Ok(DownloadResult::from_bytes(Vec::new(), ImageFrom::Network));
            }
            Ok(DownloadResult::from_bytes(vec![1, 2, 3, 4], ImageFrom::Network)
                .with_content_type("image/png"))
        }
    }

    #[derive(Default)]
    struct StubDecoder {
        calls: AtomicUsize,
        animated: bool,
    }

    impl Decoder for StubDecoder {
        fn decode(
            &self,
            _source: &DataSource,
            _transform: &TransformOptions,
        ) -> Result<Decoded, DecodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut out = decoded("image/png");
            out.animated = self.animated;
            Ok(out)
        }
    }

    struct Fixture {
        ctx: PipelineContext,
        downloader: Arc<StubDownloader>,
        decoder: Arc<StubDecoder>,
        memory: Arc<MemoryCache>,
    }

    fn fixture_with(
        disk: Arc<dyn DiskCache>,
        downloader: StubDownloader,
        decoder: StubDecoder,
    ) -> Fixture {
        let downloader = Arc::new(downloader);
        let decoder = Arc::new(decoder);
        let memory = Arc::new(MemoryCache::new(1_000));
        let ctx = PipelineContext::new(
            disk,
            Arc::clone(&memory),
            Arc::clone(&downloader) as Arc<dyn Downloader>,
            Arc::clone(&decoder) as Arc<dyn Decoder>,
        );
        Fixture {
            ctx,
            downloader,
            decoder,
            memory,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            Arc::new(NoOpDiskCache),
            StubDownloader::default(),
            StubDecoder::default(),
        )
    }

    fn request(kind: PipelineKind, uri: &str, options: Options) -> (Arc<Request>, ConsumerQueue) {
        let (handle, queue) = consumer_channel();
        (Arc::new(Request::new(kind, uri, options, handle)), queue)
    }

    /// Runs stages inline until the request is done.
    fn drive(ctx: &PipelineContext, request: &Arc<Request>) {
        let mut stage = Stage::Dispatch;
        while let StageOutcome::Next(next) = run(ctx, request, stage) {
            stage = next;
        }
    }

    #[test]
    fn test_full_display_pipeline_from_network() {
        let f = fixture();
        let (req, mut queue) = request(PipelineKind::Display, "imgA", Options::default());

        drive(&f.ctx, &req);
        queue.run_pending();

        assert_eq!(
            req.outcome(),
            Some(RequestOutcome::Completed {
                from: ImageFrom::Network,
                mime_type: "image/png".to_string()
            })
        );
        assert_eq!(f.downloader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.decoder.calls.load(Ordering::SeqCst), 1);
        let cached = f.memory.get(req.key()).unwrap();
        assert!(!cached.is_recycled());
        assert_eq!(cached.ref_count(), 0);
    }

    #[test]
    fn test_invalid_uri_fails_at_dispatch() {
        let f = fixture();
        let (req, mut queue) = request(PipelineKind::Display, "  ", Options::default());
        drive(&f.ctx, &req);
        queue.run_pending();
        assert_eq!(req.failed_cause(), Some(FailedCause::UriInvalid));
        assert_eq!(f.downloader.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_local_level_without_disk_hit_cancels() {
        let f = fixture();
        let options = Options::default().with_request_level(RequestLevel::Local);
        let (req, _queue) = request(PipelineKind::Display, "imgA", options);
        drive(&f.ctx, &req);
        assert_eq!(req.cancel_cause(), Some(CancelCause::LevelIsLocal));
        assert_eq!(f.downloader.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_paused_level_cancels_with_pause_download() {
        let f = fixture();
        let (req, _queue) = request(PipelineKind::Display, "imgA", Options::default().paused());
        drive(&f.ctx, &req);
        assert_eq!(req.cancel_cause(), Some(CancelCause::PauseDownload));
    }

    #[test]
    fn test_disk_hit_skips_download_even_when_local() {
        let dir = tempfile::TempDir::new().unwrap();
        let disk = Arc::new(FileDiskCache::new(dir.path(), 1024).unwrap());
        disk.put("imgA", b"bytes").unwrap();
        let f = fixture_with(disk, StubDownloader::default(), StubDecoder::default());

        let options = Options::default().with_request_level(RequestLevel::Local);
        let (req, mut queue) = request(PipelineKind::Display, "imgA", options);
        drive(&f.ctx, &req);
        queue.run_pending();

        assert_eq!(f.downloader.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            req.outcome(),
            Some(RequestOutcome::Completed {
                from: ImageFrom::DiskCache,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_download_fails() {
        let f = fixture_with(
            Arc::new(NoOpDiskCache),
            StubDownloader {
                empty: true,
                ..Default::default()
            },
            StubDecoder::default(),
        );
        let (req, _queue) = request(PipelineKind::Display, "imgA", Options::default());
        drive(&f.ctx, &req);
        assert_eq!(req.failed_cause(), Some(FailedCause::DownloadFail));
        assert_eq!(f.decoder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_download_kind_completes_without_decode() {
        let f = fixture();
        let (req, mut queue) = request(PipelineKind::Download, "imgA", Options::default());
        drive(&f.ctx, &req);
        queue.run_pending();
        assert_eq!(
            req.outcome(),
            Some(RequestOutcome::Completed {
                from: ImageFrom::Network,
                mime_type: "image/png".to_string()
            })
        );
        assert_eq!(f.decoder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_load_kind_bypasses_memory_cache() {
        let f = fixture();
        let (req, mut queue) = request(PipelineKind::Load, "imgA", Options::default());
        drive(&f.ctx, &req);
        queue.run_pending();
        assert!(req.outcome().unwrap().is_completed());
        assert_eq!(f.memory.entry_count(), 0);
        assert_eq!(f.memory.edit_lock_count(), 0);
    }

    #[test]
    fn test_memory_hit_at_dispatch_skips_download() {
        let f = fixture();
        f.memory.put("imgA".into(), resource("imgA"));
        let (req, mut queue) = request(PipelineKind::Display, "imgA", Options::default());
        drive(&f.ctx, &req);
        queue.run_pending();

        assert_eq!(f.downloader.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            req.outcome(),
            Some(RequestOutcome::Completed {
                from: ImageFrom::MemoryCache,
                ..
            })
        ));
    }

    #[test]
    fn test_recycled_memory_hit_is_evicted_and_redecoded() {
        let f = fixture();
        let stale = resource("imgB");
        f.memory.put("imgB".into(), Arc::clone(&stale));
        stale.recycle("owner");

        let (req, mut queue) = request(PipelineKind::Display, "imgB", Options::default());
        drive(&f.ctx, &req);
        queue.run_pending();

        assert_eq!(f.decoder.calls.load(Ordering::SeqCst), 1);
        let fresh = f.memory.get(req.key()).unwrap();
        assert!(!Arc::ptr_eq(&fresh, &stale));
        assert!(!fresh.is_recycled());
        assert!(req.outcome().unwrap().is_completed());
    }

    #[test]
    fn test_animated_resource_not_cached() {
        let f = fixture_with(
            Arc::new(NoOpDiskCache),
            StubDownloader::default(),
            StubDecoder {
                animated: true,
                ..Default::default()
            },
        );
        let (req, mut queue) = request(PipelineKind::Display, "imgA", Options::default());
        drive(&f.ctx, &req);
        queue.run_pending();
        assert!(req.outcome().unwrap().is_completed());
        assert!(!f.memory.contains(req.key()));
    }

    #[test]
    fn test_cancel_between_download_and_load_skips_insert() {
        let f = fixture();
        let (req, mut queue) = request(PipelineKind::Display, "imgA", Options::default());

        let StageOutcome::Next(Stage::Download) = run(&f.ctx, &req, Stage::Dispatch) else {
            panic!("expected download stage");
        };
        let StageOutcome::Next(load_stage @ Stage::Load(_)) = run(&f.ctx, &req, Stage::Download)
        else {
            panic!("expected load stage");
        };
        req.cancel();
        assert!(matches!(run(&f.ctx, &req, load_stage), StageOutcome::Done));
        queue.run_pending();

        assert_eq!(f.decoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.memory.entry_count(), 0);
        assert_eq!(
            req.outcome(),
            Some(RequestOutcome::Canceled(CancelCause::ExplicitCancel))
        );
    }

    #[test]
    fn test_cancel_before_display_releases_reference() {
        let f = fixture();
        let (req, _queue) = request(PipelineKind::Display, "imgA", Options::default());
        let cached = resource("imgA");
        f.memory.put("imgA".into(), Arc::clone(&cached));

        let StageOutcome::Next(display_stage @ Stage::Display(_)) =
            run(&f.ctx, &req, Stage::Dispatch)
        else {
            panic!("expected display stage");
        };
        assert_eq!(cached.ref_count(), 1);
        req.cancel();
        run(&f.ctx, &req, display_stage);
        assert_eq!(cached.ref_count(), 0);
    }

    #[test]
    fn test_statuses_advance_through_load() {
        let f = fixture();
        let (req, _queue) = request(PipelineKind::Display, "imgA", Options::default());
        let mut stage = Stage::Dispatch;
        let mut seen = vec![req.status()];
        while let StageOutcome::Next(next) = run(&f.ctx, &req, stage) {
            seen.push(req.status());
            stage = next;
        }
        assert_eq!(
            seen,
            vec![
                Status::WaitDispatch,
                Status::WaitDownload,
                Status::WaitLoad,
                Status::WaitDisplay
            ]
        );
    }
}
