//! Object storage backends.
//!
//! The [`backend::ObjectStore`] trait is the narrow contract the pipeline
//! depends on.  Implementations are an S3-compatible client (MinIO, AWS)
//! and an in-memory store used in tests and local demos.

pub mod backend;
pub mod memory;
pub mod s3;

pub use backend::{ListEntry, ObjectStore};
pub use memory::MemoryBackend;
pub use s3::S3Backend;
