//! imgpipe - an image request pipeline
//!
//! Turns image requests (a locator plus options) into decoded resources
//! delivered to a display target, through a disk cache of downloaded bytes
//! and a memory cache of decoded resources. Requests run through the stages
//! dispatch, download, load and display on worker contexts; all listener and
//! target callbacks run on a single consumer context.
//!
//! # High-Level API
//!
//! The [`service`] module wires everything from a [`config::PipelineConfig`]:
//!
//! ```ignore
//! use imgpipe::config::PipelineConfig;
//! use imgpipe::request::Options;
//! use imgpipe::service::ImagePipeline;
//!
//! let pipeline = ImagePipeline::new(PipelineConfig::default())?;
//! let handle = pipeline.load("https://img.example/a.png", Options::default(), None);
//! let outcome = handle.wait().await;
//! ```

pub mod adapters;
pub mod cache;
pub mod config;
pub mod identity;
pub mod logging;
pub mod pipeline;
pub mod request;
pub mod resource;
pub mod service;

/// Version of the imgpipe library and CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
