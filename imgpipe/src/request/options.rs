//! Per-request policy.

use crate::identity::TransformOptions;

/// Whether a request may touch the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestLevel {
    #[default]
    Any,
    /// Only serve from the memory or disk cache.
    Local,
}

/// What set the request level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestLevelFrom {
    #[default]
    Normal,
    /// Level was forced to local because downloads are paused.
    PauseDownload,
}

/// Request options, fixed at submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub cache_in_disk: bool,
    pub cache_in_memory: bool,
    pub request_level: RequestLevel,
    pub request_level_from: RequestLevelFrom,
    pub transform: TransformOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cache_in_disk: true,
            cache_in_memory: true,
            request_level: RequestLevel::Any,
            request_level_from: RequestLevelFrom::Normal,
            transform: TransformOptions::default(),
        }
    }
}

impl Options {
    pub fn with_cache_in_disk(mut self, enabled: bool) -> Self {
        self.cache_in_disk = enabled;
        self
    }

    pub fn with_cache_in_memory(mut self, enabled: bool) -> Self {
        self.cache_in_memory = enabled;
        self
    }

    pub fn with_request_level(mut self, level: RequestLevel) -> Self {
        self.request_level = level;
        self
    }

    pub fn with_transform(mut self, transform: TransformOptions) -> Self {
        self.transform = transform;
        self
    }

    /// Applies a pipeline-wide download pause.
    ///
    /// `Any` requests become `Local` with origin `PauseDownload`; requests
    /// that are already local keep their origin.
    pub fn paused(mut self) -> Self {
        if self.request_level == RequestLevel::Any {
            self.request_level = RequestLevel::Local;
            self.request_level_from = RequestLevelFrom::PauseDownload;
        }
        self
    }

    pub fn is_local_only(&self) -> bool {
        self.request_level == RequestLevel::Local
    }
}
