//! Caller-side handle to a submitted request.

use crate::identity::CacheKey;
use crate::request::{FailedCause, Request, RequestId, RequestOutcome, Status};
use std::sync::Arc;

/// Handle returned when a request is submitted.
///
/// Dropping the handle does not cancel the request.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    request: Arc<Request>,
}

impl RequestHandle {
    pub(crate) fn new(request: Arc<Request>) -> Self {
        Self { request }
    }

    pub fn id(&self) -> RequestId {
        self.request.id()
    }

    pub fn key(&self) -> &CacheKey {
        self.request.key()
    }

    pub fn status(&self) -> Status {
        self.request.status()
    }

    pub fn request(&self) -> &Arc<Request> {
        &self.request
    }

    /// Cancels the request with `EXPLICIT_CANCEL`. Returns false if it had
    /// already finished.
    pub fn cancel(&self) -> bool {
        self.request.cancel()
    }

    /// Outcome, once the listener has been notified.
    pub fn outcome(&self) -> Option<RequestOutcome> {
        self.request.outcome()
    }

    /// Waits until the terminal callback has run on the consumer context.
    ///
    /// Never resolves if the pipeline's consumer queue is not being driven.
    pub async fn wait(&self) -> RequestOutcome {
        let mut rx = self.request.subscribe();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(RequestOutcome::Failed(FailedCause::Internal))
    }
}
