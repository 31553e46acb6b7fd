//! Configuration for the image pipeline.
//!
//! - [`PipelineConfig`]: the runtime settings an
//!   [`ImagePipeline`](crate::service::ImagePipeline) is built from
//! - [`ConfigFile`]: the user's `~/.imgpipe/config.ini`, converted with
//!   [`ConfigFile::to_pipeline_config`]
//!
//! # Example
//!
//! ```
//! use imgpipe::config::PipelineConfig;
//! use std::time::Duration;
//!
//! let config = PipelineConfig::default()
//!     .with_download_concurrency(4)
//!     .with_request_timeout(Duration::from_secs(10))
//!     .without_disk_cache();
//! assert!(config.disk_cache_config().is_none());
//! ```

mod defaults;
mod file;
mod parser;
mod pipeline;
mod settings;
mod size;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use pipeline::PipelineConfig;
pub use settings::{CacheSettings, ConfigFile, LoggingSettings, NetworkSettings, PipelineSettings};
pub use size::{format_size, parse_size, SizeParseError};
