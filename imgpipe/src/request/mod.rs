//! Request model: identity, policy, status, causes and callbacks.

mod cause;
mod listener;
mod options;
#[allow(clippy::module_inception)]
mod request;
mod result;
mod status;

pub use crate::identity::RequestAttrs;
pub use cause::{CancelCause, FailedCause};
pub use listener::{Listener, Target};
pub use options::{Options, RequestLevel, RequestLevelFrom};
pub use request::{PipelineKind, Request, RequestId};
pub use result::{DataSource, DownloadResult, ImageFrom, LoadResult, RequestOutcome};
pub use status::Status;
