//! Maps request paths onto bucket/key pairs and fetches them from the
//! object store.
//!
//! With a statically configured bucket every path is a key inside that
//! bucket.  Without one, the first path segment names the bucket.  The
//! configured prefix is prepended to the key in both cases.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::errors::WebError;
use crate::pipeline::{handler_fn, Handler};
use crate::resource::Resource;
use crate::storage::ObjectStore;

/// Resolves paths against an [`ObjectStore`].
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
}

impl Resolver {
    /// Create a resolver.  An empty `bucket` means the bucket is taken
    /// from the first path segment.
    pub fn new(store: Arc<dyn ObjectStore>, bucket: &str, prefix: &str) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        }
    }

    /// The underlying object store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// The statically configured bucket, or an empty string.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Split a path into bucket and key, without the configured prefix.
    pub fn bucket_and_key(&self, url: &str) -> (String, String) {
        let url = url.strip_prefix('/').unwrap_or(url);
        if !self.bucket.is_empty() {
            return (self.bucket.clone(), url.to_string());
        }
        match url.split_once('/') {
            Some((bucket, key)) => (bucket.to_string(), key.to_string()),
            None => (url.to_string(), String::new()),
        }
    }

    /// Resolve a path to the bucket and the full (prefixed) key.
    pub fn resolve(&self, url: &str) -> Result<(String, String), WebError> {
        let (bucket, key) = self.bucket_and_key(url);
        if bucket.is_empty() {
            return Err(WebError::BucketNotKnown {
                path: url.to_string(),
            });
        }
        Ok((bucket, format!("{}{}", self.prefix, key)))
    }

    /// Fetch metadata only.  The returned resource carries no stream.
    pub async fn stat_object(&self, url: &str) -> Result<Resource, WebError> {
        let (bucket, key) = self.resolve(url)?;
        let info = self.store.stat_object(&bucket, &key).await?;
        Ok(Resource::header_only(info).with_msg(format!("StatObject[{bucket}/{key}] ok")))
    }

    /// Fetch metadata, then the object stream.
    pub async fn get_object(&self, url: &str) -> Result<Resource, WebError> {
        let (bucket, key) = self.resolve(url)?;
        let info = self.store.stat_object(&bucket, &key).await?;
        let stream = self.store.get_object(&bucket, &key).await?;
        Ok(Resource::new(stream, info)
            .with_msg(format!("GET[{url}] -> GetObject[{bucket}/{key}] ok")))
    }

    /// The resolver's StatObject role as a pipeline handler.
    pub fn stat_handler(self: &Arc<Self>) -> Handler {
        let resolver = Arc::clone(self);
        handler_fn(move |url: String| {
            let resolver = Arc::clone(&resolver);
            async move { resolver.stat_object(&url).await }
        })
    }

    /// The resolver's GetObject role as a pipeline handler.
    pub fn get_handler(self: &Arc<Self>) -> Handler {
        let resolver = Arc::clone(self);
        handler_fn(move |url: String| {
            let resolver = Arc::clone(&resolver);
            async move { resolver.get_object(&url).await }
        })
    }

    /// Probe the backend once: the configured bucket must exist, or, with
    /// no bucket configured, the store must answer a bucket listing.
    pub async fn test_connection(&self) -> anyhow::Result<String> {
        if !self.bucket.is_empty() {
            let exists = self.store.bucket_exists(&self.bucket).await?;
            if !exists {
                anyhow::bail!("bucket {} does not exist", self.bucket);
            }
            return Ok(format!("bucket {}: {}", self.bucket, exists));
        }
        let buckets = self.store.list_buckets().await?;
        Ok(format!("# buckets found: {}", buckets.len()))
    }

    /// Retry [`Resolver::test_connection`] until it succeeds or the
    /// attempts run out.  The last failure is returned.
    pub async fn wait_for_backend(&self, attempts: u32, delay: Duration) -> anyhow::Result<String> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.test_connection().await {
                Ok(msg) => {
                    info!("Connected to object store: {}", msg);
                    return Ok(msg);
                }
                Err(err) if attempt < attempts => {
                    warn!(
                        "Object store not reachable (attempt {}/{}): {}",
                        attempt, attempts, err
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    return Err(err.context(format!(
                        "object store not reachable after {attempts} attempts"
                    )))
                }
            }
        }
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
