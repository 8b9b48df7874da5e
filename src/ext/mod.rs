//! Pipeline extensions.
//!
//! An [`Extension`] is a one-shot installer: it runs against the
//! [`PipelineBuilder`] at startup, adds handlers or decorators, and returns
//! a status line for the startup log.  Extensions are applied in order and
//! later ones wrap earlier ones.

pub mod cache;
pub mod favicon;
pub mod index;
pub mod listing;
pub mod markdown;

use crate::errors::WebError;
use crate::pipeline::PipelineBuilder;

pub use cache::{cache_extension, ResourceCache};
pub use favicon::{favicon_extension, Favicon};
pub use index::{index_extension, DEFAULT_INDEX_FILE};
pub use listing::{listing_extension, FolderListing};
pub use markdown::{markdown_extension, MarkdownRenderer};

/// Installs handlers or decorators and describes what it did.
pub type Extension = Box<dyn FnOnce(&mut PipelineBuilder) -> Result<String, WebError> + Send>;
