//! Terminal reason codes.

use std::fmt;

/// Why a request failed.
///
/// Failures are never retried internally; the caller may resubmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailedCause {
    /// The download produced neither a disk cache entry nor bytes.
    DownloadFail,
    /// The decoder produced no usable resource.
    DecodeFail,
    /// The decoded resource was recycled before it could be delivered.
    ResourceRecycled,
    /// The locator was empty or blank.
    UriInvalid,
    /// A stage task panicked or the executor shut down.
    Internal,
}

impl FailedCause {
    pub fn as_str(self) -> &'static str {
        match self {
            FailedCause::DownloadFail => "DOWNLOAD_FAIL",
            FailedCause::DecodeFail => "DECODE_FAIL",
            FailedCause::ResourceRecycled => "RESOURCE_RECYCLED",
            FailedCause::UriInvalid => "URI_INVALID",
            FailedCause::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for FailedCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request was canceled. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelCause {
    /// Local-only request with nothing cached locally.
    LevelIsLocal,
    /// Like `LevelIsLocal`, but the level came from a download pause.
    PauseDownload,
    /// The display target detached from the request.
    BindDisconnect,
    /// The caller canceled the request.
    ExplicitCancel,
}

impl CancelCause {
    pub fn as_str(self) -> &'static str {
        match self {
            CancelCause::LevelIsLocal => "LEVEL_IS_LOCAL",
            CancelCause::PauseDownload => "PAUSE_DOWNLOAD",
            CancelCause::BindDisconnect => "BIND_DISCONNECT",
            CancelCause::ExplicitCancel => "EXPLICIT_CANCEL",
        }
    }
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
