//! High-level facade over the request pipeline.
//!
//! [`ImagePipeline`] wires the caches, the download and decode collaborators,
//! the dispatcher and the consumer context from a
//! [`PipelineConfig`](crate::config::PipelineConfig), and hands back a
//! [`RequestHandle`] for every submitted request.

mod builder;
mod error;
mod facade;
mod handle;

pub use builder::ImagePipelineBuilder;
pub use error::ServiceError;
pub use facade::ImagePipeline;
pub use handle::RequestHandle;
