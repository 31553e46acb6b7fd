//! Stage results and terminal outcomes.

use super::cause::{CancelCause, FailedCause};
use crate::cache::DiskCacheEntry;
use crate::resource::DecodedResource;
use std::borrow::Cow;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Provenance of a result: which tier ultimately supplied it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFrom {
    MemoryCache,
    DiskCache,
    Network,
    /// Read straight from a local file locator.
    Local,
}

impl ImageFrom {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFrom::MemoryCache => "MEMORY_CACHE",
            ImageFrom::DiskCache => "DISK_CACHE",
            ImageFrom::Network => "NETWORK",
            ImageFrom::Local => "LOCAL",
        }
    }
}

impl fmt::Display for ImageFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where downloaded bytes live.
#[derive(Debug, Clone)]
pub enum DataSource {
    DiskCache(DiskCacheEntry),
    Bytes(Vec<u8>),
    LocalFile(PathBuf),
}

impl DataSource {
    /// Reads the bytes. Blocks on I/O for file-backed sources; in-memory
    /// bytes are borrowed.
    pub fn read(&self) -> io::Result<Cow<'_, [u8]>> {
        match self {
            DataSource::DiskCache(entry) => entry.read().map(Cow::Owned),
            DataSource::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
            DataSource::LocalFile(path) => std::fs::read(path).map(Cow::Owned),
        }
    }
}

/// Outcome of the download stage.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub source: DataSource,
    pub from: ImageFrom,
    /// Content type reported by the transport, if any.
    pub content_type: Option<String>,
}

impl DownloadResult {
    pub fn from_disk(entry: DiskCacheEntry) -> Self {
        Self {
            source: DataSource::DiskCache(entry),
            from: ImageFrom::DiskCache,
            content_type: None,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>, from: ImageFrom) -> Self {
        Self {
            source: DataSource::Bytes(bytes),
            from,
            content_type: None,
        }
    }

    pub fn from_local(path: PathBuf) -> Self {
        Self {
            source: DataSource::LocalFile(path),
            from: ImageFrom::Local,
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// True when there is nothing to decode: no bytes held in memory.
    ///
    /// File-backed sources are never empty here; a missing or empty file is
    /// reported by the decoder instead.
    pub fn is_empty(&self) -> bool {
        matches!(&self.source, DataSource::Bytes(bytes) if bytes.is_empty())
    }
}

/// Outcome of the load stage.
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub resource: Arc<DecodedResource>,
    pub from: ImageFrom,
}

impl LoadResult {
    pub fn new(resource: Arc<DecodedResource>, from: ImageFrom) -> Self {
        Self { resource, from }
    }

    pub fn mime_type(&self) -> &str {
        self.resource.mime_type()
    }

    pub fn origin_width(&self) -> u32 {
        self.resource.info().origin_width
    }

    pub fn origin_height(&self) -> u32 {
        self.resource.info().origin_height
    }
}

/// Terminal outcome of a request, as reported to its listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Completed { from: ImageFrom, mime_type: String },
    Failed(FailedCause),
    Canceled(CancelCause),
}

impl RequestOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RequestOutcome::Completed { .. })
    }
}

impl fmt::Display for RequestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestOutcome::Completed { from, mime_type } => {
                write!(f, "completed from={} mime={}", from, mime_type)
            }
            RequestOutcome::Failed(cause) => write!(f, "failed: {}", cause),
            RequestOutcome::Canceled(cause) => write!(f, "canceled: {}", cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bytes_result() {
        assert!(DownloadResult::from_bytes(Vec::new(), ImageFrom::Network).is_empty());
        assert!(!DownloadResult::from_bytes(vec![1], ImageFrom::Network).is_empty());
        assert!(!DownloadResult::from_local(PathBuf::from("/tmp/a.png")).is_empty());
    }

    #[test]
    fn test_in_memory_bytes_are_borrowed() {
        let result = DownloadResult::from_bytes(vec![1, 2, 3], ImageFrom::Network);
        let bytes = result.source.read().unwrap();
        assert!(matches!(bytes, Cow::Borrowed(_)));
        assert_eq!(&*bytes, &[1u8, 2, 3]);
    }

    #[test]
    fn test_local_file_is_read() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, b"png").unwrap();

        let source = DataSource::LocalFile(path);
        let bytes = source.read().unwrap();
        assert!(matches!(bytes, Cow::Owned(_)));
        assert_eq!(&*bytes, b"png");
    }

    #[test]
    fn test_outcome_display() {
        let completed = RequestOutcome::Completed {
            from: ImageFrom::Network,
            mime_type: "image/png".to_string(),
        };
        assert_eq!(completed.to_string(), "completed from=NETWORK mime=image/png");
        assert_eq!(
            RequestOutcome::Failed(FailedCause::DecodeFail).to_string(),
            "failed: DECODE_FAIL"
        );
        assert_eq!(
            RequestOutcome::Canceled(CancelCause::LevelIsLocal).to_string(),
            "canceled: LEVEL_IS_LOCAL"
        );
    }
}
