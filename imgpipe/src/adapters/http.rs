//! Blocking HTTP downloader over reqwest.

use crate::pipeline::{DownloadError, DownloadTask, Downloader};
use crate::request::{DataSource, DownloadResult, ImageFrom};
use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use std::io::Read;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// User-Agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("imgpipe/", env!("CARGO_PKG_VERSION"));

const CHUNK_SIZE: usize = 16 * 1024;

/// Upper bound for pre-allocating the body buffer from Content-Length.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

/// Downloads over HTTP(S), streaming the body in chunks.
///
/// Cancellation and progress are checked after every chunk. When the task
/// carries a disk cache the body is written through and the result points at
/// the stored entry; a failed write falls back to in-memory bytes.
pub struct HttpDownloader {
    timeout: Duration,
    user_agent: String,
    // Built on first use: the blocking client must not be created on an
    // async runtime thread, and downloads always run on blocking workers.
    client: Mutex<Option<reqwest::blocking::Client>>,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            client: Mutex::new(None),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn client(&self) -> Result<reqwest::blocking::Client, DownloadError> {
        let mut slot = self.client.lock();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(|e| DownloadError::Transport(format!("failed to create HTTP client: {}", e)))?;
        *slot = Some(client.clone());
        Ok(client)
    }
}

impl Drop for HttpDownloader {
    fn drop(&mut self) {
        // Dropping the blocking client joins its runtime thread, which panics
        // inside an async context; hand it to a plain thread instead.
        if let Some(client) = self.client.get_mut().take() {
            if tokio::runtime::Handle::try_current().is_ok() {
                std::thread::spawn(move || drop(client));
            }
        }
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, task: &DownloadTask<'_>) -> Result<DownloadResult, DownloadError> {
        let client = self.client()?;
        debug!(uri = task.uri, "HTTP GET");

        let mut response = client
            .get(task.uri)
            .send()
            .map_err(|e| DownloadError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                uri: task.uri.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(media_type);
        let total = response.content_length().unwrap_or(0);

        let mut body = Vec::with_capacity(total.min(MAX_PREALLOC) as usize);
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            if task.is_cancelled() {
                debug!(uri = task.uri, received = body.len(), "Download abandoned");
                return Err(DownloadError::Canceled);
            }
            let n = response.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
            trace!(uri = task.uri, received = body.len(), total, "Chunk");
            task.report_progress(total, body.len() as u64);
        }

        let source = match task.disk_cache {
            Some(disk) if !body.is_empty() => match disk.put(task.disk_key, &body) {
                Ok(entry) => DataSource::DiskCache(entry),
                Err(e) => {
                    warn!(uri = task.uri, error = %e, "Disk cache write-through failed");
                    DataSource::Bytes(body)
                }
            },
            _ => DataSource::Bytes(body),
        };

        Ok(DownloadResult {
            source,
            from: ImageFrom::Network,
            content_type,
        })
    }
}

/// Serves only `file://` locators and absolute paths; everything else fails.
///
/// For running the pipeline fully offline.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileDownloader;

impl Downloader for LocalFileDownloader {
    fn download(&self, task: &DownloadTask<'_>) -> Result<DownloadResult, DownloadError> {
        match crate::identity::UriKind::classify(task.uri) {
            crate::identity::UriKind::LocalFile(path) => {
                let bytes = std::fs::read(path)?;
                Ok(DownloadResult::from_bytes(bytes, ImageFrom::Local))
            }
            _ => Err(DownloadError::Transport(format!(
                "network disabled, cannot fetch '{}'",
                task.uri
            ))),
        }
    }
}

/// Strips parameters from a Content-Type value: `image/png; q=1` -> `image/png`.
fn media_type(value: &str) -> Option<String> {
    let media = value.split(';').next()?.trim();
    if media.is_empty() {
        None
    } else {
        Some(media.to_ascii_lowercase())
    }
}
