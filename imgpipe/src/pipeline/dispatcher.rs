//! Schedules request stages onto blocking workers.
//!
//! Every submitted request gets its own drive task on the async runtime. The
//! drive task runs the request's stages strictly one after another, each on
//! the [`BlockingExecutor`], so stages of different requests run in parallel
//! while a single request never has two stages in flight. Download and load
//! stages first take a permit from their semaphore, which bounds how many
//! transfers and decodes run at once across the whole pipeline.

use super::context::PipelineContext;
use super::executor::{BlockingExecutor, TokioExecutor};
use super::stages::{self, Stage, StageOutcome};
use crate::request::{FailedCause, Request};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

/// Drives requests through the stage state machine.
pub struct Dispatcher<E: BlockingExecutor = TokioExecutor> {
    ctx: PipelineContext,
    executor: Arc<E>,
    download_permits: Arc<Semaphore>,
    decode_permits: Arc<Semaphore>,
    active: AtomicUsize,
}

impl<E: BlockingExecutor> Dispatcher<E> {
    /// Creates a dispatcher. Concurrency limits are clamped to at least one.
    pub fn new(
        ctx: PipelineContext,
        executor: E,
        download_concurrency: usize,
        decode_concurrency: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            executor: Arc::new(executor),
            download_permits: Arc::new(Semaphore::new(download_concurrency.max(1))),
            decode_permits: Arc::new(Semaphore::new(decode_concurrency.max(1))),
            active: AtomicUsize::new(0),
        })
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Number of requests whose drive task has not finished yet.
    pub fn active_requests(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Spawns the drive task for `request` on the current Tokio runtime.
    pub fn submit(self: &Arc<Self>, request: Arc<Request>) -> JoinHandle<()> {
        debug!(
            request_id = %request.id(),
            key = %request.key(),
            kind = %request.kind(),
            "Submitting request"
        );
        self.active.fetch_add(1, Ordering::Relaxed);
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            dispatcher.drive(request).await;
            dispatcher.active.fetch_sub(1, Ordering::Relaxed);
        })
    }

    async fn drive(&self, request: Arc<Request>) {
        let mut stage = Stage::Dispatch;
        loop {
            let name = stage.name();
            let Some(permit) = self.acquire_permit(&stage, &request).await else {
                return;
            };
            trace!(request_id = %request.id(), stage = name, "Running stage");

            let outcome = if matches!(stage, Stage::Display(_)) {
                // Only posts to the consumer context; no need for a worker.
                stages::run(&self.ctx, &request, stage)
            } else {
                let ctx = self.ctx.clone();
                let req = Arc::clone(&request);
                match self
                    .executor
                    .execute_blocking(move || stages::run(&ctx, &req, stage))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(request_id = %request.id(), stage = name, error = %e, "Stage task failed");
                        request.failed(FailedCause::Internal);
                        return;
                    }
                }
            };
            drop(permit);

            match outcome {
                StageOutcome::Next(next) => stage = next,
                StageOutcome::Done => return,
            }
        }
    }

    /// Waits for the stage's concurrency permit.
    ///
    /// Returns `None` if the request was canceled while waiting, or if the
    /// semaphore was closed (the request is failed in that case). Stages
    /// without a limit get `Some(None)`.
    async fn acquire_permit(
        &self,
        stage: &Stage,
        request: &Arc<Request>,
    ) -> Option<Option<OwnedSemaphorePermit>> {
        let semaphore = match stage {
            Stage::Download => &self.download_permits,
            Stage::Load(_) => &self.decode_permits,
            Stage::Dispatch | Stage::Display(_) => return Some(None),
        };

        tokio::select! {
            biased;
            _ = request.cancellation_token().cancelled() => {
                debug!(request_id = %request.id(), stage = stage.name(), "Canceled while waiting for permit");
                None
            }
            permit = Arc::clone(semaphore).acquire_owned() => match permit {
                Ok(permit) => Some(Some(permit)),
                Err(_) => {
                    request.failed(FailedCause::Internal);
                    None
                }
            }
        }
    }
}
