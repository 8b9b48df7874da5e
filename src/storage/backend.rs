//! Abstract object store contract.
//!
//! The pipeline depends only on [`ObjectStore`], never on store-specific
//! types.  Metadata comes back as [`ResourceInfo`] and object bodies as a
//! [`ByteStream`], so callers do not need to know the underlying client.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

use crate::resource::{ByteStream, ResourceInfo};

/// One entry of a non-recursive listing.
///
/// Pseudo-directories ("common prefixes") are reported with their full
/// prefix as key (ending in `/`), size 0 and no timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Full object key or common prefix.
    pub key: String,
    /// Size in bytes (0 for pseudo-directories).
    pub size: u64,
    /// Last modification time, if known.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Async object store contract.
pub trait ObjectStore: Send + Sync + 'static {
    /// Fetch metadata for `bucket`/`key` without the body.
    fn stat_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ResourceInfo>> + Send + '_>>;

    /// Open the body of `bucket`/`key` as a stream.
    fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ByteStream>> + Send + '_>>;

    /// List objects directly under `prefix` (non-recursive).
    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<ListEntry>>> + Send + '_>>;

    /// Check whether `bucket` exists.
    fn bucket_exists(
        &self,
        bucket: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>>;

    /// List the names of all buckets visible to the credentials.
    fn list_buckets(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<String>>> + Send + '_>>;
}
