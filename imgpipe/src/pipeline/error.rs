//! Collaborator error types.
//!
//! These never cross a stage boundary: the stage that receives one logs it
//! and turns it into a `FailedCause` on the request.

use crate::cache::CacheError;
use thiserror::Error;

/// Errors from a [`Downloader`](super::Downloader).
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Server answered with a non-success status
    #[error("HTTP status {status} for {uri}")]
    HttpStatus { uri: String, status: u16 },

    /// Connection, TLS or protocol failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Reading the body failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Writing through to the disk cache failed
    #[error("disk cache write failed: {0}")]
    Cache(#[from] CacheError),

    /// The request was canceled mid-transfer
    #[error("download canceled")]
    Canceled,
}

/// Errors from a [`Decoder`](super::Decoder).
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Reading the source bytes failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The codec rejected the data
    #[error("codec error: {0}")]
    Codec(String),

    /// There were no bytes to decode
    #[error("empty input")]
    Empty,
}
