//! The request record and its terminal transitions.
//!
//! A [`Request`] is shared between the dispatcher's drive task, the
//! blocking workers running its stages and the consumer context. Status and
//! terminal causes live under one lock so that moving to a terminal state is
//! a single check-and-set: the first of `failed`, `canceled` or the completed
//! callback wins, and every later attempt is ignored. Each winning transition
//! schedules exactly one listener notification on the consumer context.

use super::cause::{CancelCause, FailedCause};
use super::listener::{Listener, Target};
use super::options::Options;
use super::result::{ImageFrom, RequestOutcome};
use super::status::Status;
use crate::identity::{CacheKey, RequestAttrs};
use crate::pipeline::ConsumerHandle;
use crate::resource::ResourceRef;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a request, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Which stages a request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// Dispatch and download only; completes with the download provenance.
    Download,
    /// Download and decode, bypassing the memory cache.
    Load,
    /// The full pipeline: memory cache, edit lock, target binding.
    Display,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineKind::Download => f.write_str("download"),
            PipelineKind::Load => f.write_str("load"),
            PipelineKind::Display => f.write_str("display"),
        }
    }
}

#[derive(Debug)]
struct State {
    status: Status,
    failed_cause: Option<FailedCause>,
    cancel_cause: Option<CancelCause>,
}

/// A single image request moving through the pipeline.
pub struct Request {
    id: RequestId,
    kind: PipelineKind,
    attrs: RequestAttrs,
    options: Options,
    state: Mutex<State>,
    cancel: CancellationToken,
    listener: Option<Arc<dyn Listener>>,
    target: Option<Arc<dyn Target>>,
    consumer: ConsumerHandle,
    outcome: watch::Sender<Option<RequestOutcome>>,
}

impl Request {
    /// Creates a request in `WAIT_DISPATCH`. The cache key is derived from
    /// the locator and the options' transforms.
    pub fn new(
        kind: PipelineKind,
        uri: impl Into<String>,
        options: Options,
        consumer: ConsumerHandle,
    ) -> Self {
        let attrs = RequestAttrs::new(uri, &options.transform);
        let (outcome, _) = watch::channel(None);
        Self {
            id: RequestId::next(),
            kind,
            attrs,
            options,
            state: Mutex::new(State {
                status: Status::WaitDispatch,
                failed_cause: None,
                cancel_cause: None,
            }),
            cancel: CancellationToken::new(),
            listener: None,
            target: None,
            consumer,
            outcome,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.attrs = self.attrs.with_name(name);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_target(mut self, target: Arc<dyn Target>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn attrs(&self) -> &RequestAttrs {
        &self.attrs
    }

    pub fn key(&self) -> &CacheKey {
        self.attrs.key()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn target(&self) -> Option<&Arc<dyn Target>> {
        self.target.as_ref()
    }

    pub fn status(&self) -> Status {
        self.state.lock().status
    }

    pub fn failed_cause(&self) -> Option<FailedCause> {
        self.state.lock().failed_cause
    }

    pub fn cancel_cause(&self) -> Option<CancelCause> {
        self.state.lock().cancel_cause
    }

    /// Token cancelled when the request is canceled. Long-running
    /// collaborators poll it to abandon work early.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    /// Cancellation check used at every stage boundary.
    ///
    /// A detached target cancels the request with `BIND_DISCONNECT` as a
    /// side effect.
    pub fn is_canceled(self: &Arc<Self>) -> bool {
        let status = self.status();
        if status == Status::Canceled {
            return true;
        }
        if status.is_terminal() {
            return false;
        }
        match &self.target {
            Some(target) if !target.is_attached() => {
                self.canceled(CancelCause::BindDisconnect);
                true
            }
            _ => false,
        }
    }

    /// Cancels the request. Returns false if it had already finished.
    pub fn cancel(self: &Arc<Self>) -> bool {
        self.canceled(CancelCause::ExplicitCancel)
    }

    /// Terminal outcome once the listener has been notified.
    pub fn outcome(&self) -> Option<RequestOutcome> {
        self.outcome.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<RequestOutcome>> {
        self.outcome.subscribe()
    }

    /// Advances the status. Backward moves and moves out of a terminal
    /// status are ignored and return false.
    pub(crate) fn set_status(&self, next: Status) -> bool {
        let mut state = self.state.lock();
        if !state.status.can_advance_to(next) {
            trace!(
                request_id = %self.id,
                from = %state.status,
                to = %next,
                "Ignoring status transition"
            );
            return false;
        }
        trace!(request_id = %self.id, from = %state.status, to = %next, "Status");
        state.status = next;
        true
    }

    pub(crate) fn canceled(self: &Arc<Self>, cause: CancelCause) -> bool {
        {
            let mut state = self.state.lock();
            if state.status.is_terminal() {
                return false;
            }
            state.status = Status::Canceled;
            state.cancel_cause = Some(cause);
        }
        self.cancel.cancel();
        debug!(request_id = %self.id, key = %self.key(), cause = %cause, "Request canceled");

        let request = Arc::clone(self);
        self.post_terminal(RequestOutcome::Canceled(cause), move || {
            if let Some(listener) = &request.listener {
                listener.on_canceled(cause);
            }
            request.publish(RequestOutcome::Canceled(cause));
        });
        true
    }

    pub(crate) fn failed(self: &Arc<Self>, cause: FailedCause) -> bool {
        {
            let mut state = self.state.lock();
            if state.status.is_terminal() {
                return false;
            }
            state.status = Status::Failed;
            state.failed_cause = Some(cause);
        }
        warn!(request_id = %self.id, key = %self.key(), cause = %cause, "Request failed");

        let request = Arc::clone(self);
        self.post_terminal(RequestOutcome::Failed(cause), move || {
            if let Some(target) = request.target.as_ref().filter(|t| t.is_attached()) {
                target.display_failed(cause);
            }
            if let Some(listener) = &request.listener {
                listener.on_failed(cause);
            }
            request.publish(RequestOutcome::Failed(cause));
        });
        true
    }

    /// Schedules the completed callback on the consumer context.
    ///
    /// `held` keeps the resource alive until the callback has run (or been
    /// skipped because the request was canceled in the meantime).
    pub(crate) fn post_completed(
        self: &Arc<Self>,
        from: ImageFrom,
        mime_type: String,
        held: Option<ResourceRef>,
    ) {
        let request = Arc::clone(self);
        let posted = self
            .consumer
            .post(move || request.run_completed(from, mime_type, held));
        if !posted {
            warn!(request_id = %self.id, "Consumer context closed, dropping completion");
            self.failed_without_consumer();
        }
    }

    /// Posts download progress. Dropped once the request has finished.
    pub(crate) fn update_progress(self: &Arc<Self>, total: u64, completed: u64) {
        if self.listener.is_none() || self.is_finished() {
            return;
        }
        let request = Arc::clone(self);
        self.consumer.post(move || {
            if request.is_finished() {
                return;
            }
            if let Some(listener) = &request.listener {
                listener.on_progress(total, completed);
            }
        });
    }

    fn run_completed(self: &Arc<Self>, from: ImageFrom, mime_type: String, held: Option<ResourceRef>) {
        if self.is_canceled() {
            debug!(request_id = %self.id, "Canceled before delivery, releasing resource");
            return;
        }
        {
            let mut state = self.state.lock();
            if state.status.is_terminal() {
                return;
            }
            state.status = Status::Completed;
        }

        if let (Some(target), Some(held)) = (&self.target, &held) {
            target.display(held.resource(), from);
        }
        if let Some(listener) = &self.listener {
            listener.on_completed(from, &mime_type);
        }
        drop(held);
        debug!(request_id = %self.id, key = %self.key(), from = %from, "Request completed");
        self.publish(RequestOutcome::Completed { from, mime_type });
    }

    fn post_terminal<F>(&self, outcome: RequestOutcome, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.consumer.post(callback) {
            warn!(request_id = %self.id, "Consumer context closed, listener not notified");
            self.publish(outcome);
        }
    }

    fn failed_without_consumer(&self) {
        let mut state = self.state.lock();
        if state.status.is_terminal() {
            return;
        }
        state.status = Status::Failed;
        state.failed_cause = Some(FailedCause::Internal);
        drop(state);
        self.publish(RequestOutcome::Failed(FailedCause::Internal));
    }

    fn publish(&self, outcome: RequestOutcome) {
        self.outcome.send_replace(Some(outcome));
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("key", self.key())
            .field("status", &self.status())
            .finish()
    }
}
