//! Pipeline stage status.

use std::fmt;

/// Current stage of a request.
///
/// Variants are declared in execution order; a request only ever moves
/// forward through this list, except for the jumps to [`Status::Failed`] or
/// [`Status::Canceled`] which are reachable from any non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    WaitDispatch,
    Dispatching,
    WaitDownload,
    Downloading,
    WaitLoad,
    GetMemoryCacheEditLock,
    CheckMemoryCache,
    Loading,
    WaitDisplay,
    Completed,
    Failed,
    Canceled,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Canceled)
    }

    /// Whether a non-terminal transition from `self` to `next` is allowed.
    pub fn can_advance_to(self, next: Status) -> bool {
        !self.is_terminal() && !next.is_terminal() && next > self
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::WaitDispatch => "WAIT_DISPATCH",
            Status::Dispatching => "DISPATCHING",
            Status::WaitDownload => "WAIT_DOWNLOAD",
            Status::Downloading => "DOWNLOADING",
            Status::WaitLoad => "WAIT_LOAD",
            Status::GetMemoryCacheEditLock => "GET_MEMORY_CACHE_EDIT_LOCK",
            Status::CheckMemoryCache => "CHECK_MEMORY_CACHE",
            Status::Loading => "LOADING",
            Status::WaitDisplay => "WAIT_DISPLAY",
            Status::Completed => "COMPLETED",
            Status::Failed => "FAILED",
            Status::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(Status::Completed.is_terminal());
        assert!(Status::Failed.is_terminal());
        assert!(Status::Canceled.is_terminal());
        assert!(!Status::Loading.is_terminal());
        assert!(!Status::WaitDispatch.is_terminal());
    }

    #[test]
    fn test_forward_only() {
        assert!(Status::WaitDispatch.can_advance_to(Status::Dispatching));
        assert!(Status::Dispatching.can_advance_to(Status::WaitLoad));
        assert!(!Status::Loading.can_advance_to(Status::Downloading));
        assert!(!Status::Loading.can_advance_to(Status::Loading));
    }

    #[test]
    fn test_no_advance_from_or_into_terminal() {
        assert!(!Status::Canceled.can_advance_to(Status::WaitDisplay));
        assert!(!Status::Loading.can_advance_to(Status::Completed));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Status::GetMemoryCacheEditLock.to_string(),
            "GET_MEMORY_CACHE_EDIT_LOCK"
        );
    }
}
