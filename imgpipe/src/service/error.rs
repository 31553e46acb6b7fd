//! Service error types.

use crate::cache::CacheError;
use std::fmt;

/// Errors building an [`ImagePipeline`](super::ImagePipeline).
#[derive(Debug)]
pub enum ServiceError {
    /// Failed to open the disk cache
    CacheError(CacheError),
    /// Invalid configuration
    ConfigError(String),
    /// No Tokio runtime to run the pipeline on
    RuntimeError(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CacheError(e) => write!(f, "Cache error: {}", e),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::RuntimeError(msg) => write!(f, "Runtime error: {}", msg),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CacheError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CacheError> for ServiceError {
    fn from(e: CacheError) -> Self {
        Self::CacheError(e)
    }
}
