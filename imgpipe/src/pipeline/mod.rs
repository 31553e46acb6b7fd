//! Request execution pipeline.
//!
//! This module ties the request state machine to the runtime:
//!
//! - [`PipelineContext`]: caches and download/decode collaborators
//! - [`Dispatcher`]: runs each request's stages on blocking workers, bounded
//!   by download and decode permits
//! - [`ConsumerHandle`] / [`ConsumerQueue`]: the serial context that runs
//!   listener callbacks
//! - [`BlockingExecutor`]: abstraction over `spawn_blocking`
//!
//! The stage functions themselves are internal; see `stages.rs` for the
//! state machine.

mod consumer;
mod context;
mod dispatcher;
mod error;
mod executor;
mod stages;

pub use consumer::{consumer_channel, ConsumerHandle, ConsumerQueue};
pub use context::{Decoder, DownloadTask, Downloader, PipelineContext};
pub use dispatcher::Dispatcher;
pub use error::{DecodeError, DownloadError};
pub use executor::{BlockingExecutor, BlockingFuture, ExecutorError, InlineExecutor, TokioExecutor};
