//! minio-web library: serve objects from an S3-compatible store over plain
//! HTTP GET and HEAD.
//!
//! Requests flow through a [`pipeline::Pipeline`] of resolution handlers
//! (backed by [`resolver::Resolver`]) and the decorators installed by the
//! [`ext`] extensions: index files, fallback favicon, folder listings,
//! caching and markdown rendering.

pub mod app;
pub mod cache;
pub mod config;
pub mod errors;
pub mod ext;
pub mod metrics;
pub mod pipeline;
pub mod resolver;
pub mod resource;
pub mod server;
pub mod storage;

use crate::pipeline::Pipeline;

/// Shared application state passed to the fallback handler via
/// `axum::extract::State`.
#[derive(Debug)]
pub struct AppState {
    /// The frozen request pipeline.
    pub pipeline: Pipeline,
}
