//! Production implementations of the download and decode collaborators.

mod decoder;
mod http;

pub use decoder::ImageDecoder;
pub use http::{HttpDownloader, LocalFileDownloader, DEFAULT_USER_AGENT};
