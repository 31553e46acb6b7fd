//! Consumer-facing callbacks.
//!
//! Everything in this module is invoked on the consumer context only, never
//! concurrently for the same request.

use super::cause::{CancelCause, FailedCause};
use super::result::ImageFrom;
use crate::resource::DecodedResource;
use std::sync::Arc;

/// Receives the terminal outcome and progress of a request.
pub trait Listener: Send + Sync {
    fn on_completed(&self, from: ImageFrom, mime_type: &str);

    fn on_failed(&self, cause: FailedCause);

    fn on_canceled(&self, cause: CancelCause);

    /// Download progress in bytes. `total` is zero when unknown.
    fn on_progress(&self, _total: u64, _completed: u64) {}
}

/// A display surface bound to a request.
pub trait Target: Send + Sync {
    /// False once the surface has been rebound or torn down. Checked at
    /// every cancellation point; a detached target cancels the request with
    /// `BIND_DISCONNECT`.
    fn is_attached(&self) -> bool {
        true
    }

    /// Shows the resource. The resource is guaranteed live for the duration
    /// of the call.
    fn display(&self, resource: &Arc<DecodedResource>, from: ImageFrom);

    fn display_failed(&self, _cause: FailedCause) {}
}
