//! Caches GetObject results in memory.
//!
//! Entries are stored serialized (MessagePack via `rmp-serde`) in an
//! [`ArcCache`] keyed by the literal request path.  A hit is served
//! without contacting the store and without revalidation.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::ArcCache;
use crate::ext::Extension;
use crate::metrics::{CACHE_ADMISSIONS_TOTAL, CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};
use crate::pipeline::{handler_fn, Handler, PipelineBuilder};
use crate::resource::{Resource, ResourceInfo};

/// Serialized form of a cached resource.
#[derive(Debug, Serialize, Deserialize)]
struct CachableResource {
    data: Bytes,
    info: ResourceInfo,
}

/// Path-keyed cache of fully materialized resources.
#[derive(Debug)]
pub struct ResourceCache {
    store: ArcCache<String, Bytes>,
    max_size: u64,
}

impl ResourceCache {
    /// `capacity` bounds the number of entries; only resources strictly
    /// smaller than `max_size` bytes are admitted (0 admits nothing).
    pub fn new(capacity: usize, max_size: u64, ttl: Duration) -> Self {
        Self {
            store: ArcCache::new(capacity).with_ttl(ttl),
            max_size,
        }
    }

    /// Whether a resource of this size would be admitted.
    pub fn admits(&self, size: u64) -> bool {
        self.max_size > 0 && size < self.max_size
    }

    /// Rebuild a cached resource.  Decode failures count as misses.
    pub fn lookup(&self, path: &str) -> Option<Resource> {
        let raw = self.store.get(&path.to_string())?;
        match rmp_serde::from_slice::<CachableResource>(&raw) {
            Ok(cached) => Some(
                Resource::from_bytes(cached.data, cached.info)
                    .with_msg(format!("loading {path} from cache")),
            ),
            Err(err) => {
                warn!("Unable to decode cached resource[{}]: {}", path, err);
                None
            }
        }
    }

    /// Materialize the resource and store a copy.  The resource is left
    /// with a fresh in-memory stream over the same bytes.  Failures only
    /// skip the write.
    pub async fn admit(&self, path: &str, res: &mut Resource) {
        if !self.admits(res.info.size) {
            return;
        }
        let data = match res.materialize().await {
            Ok(data) => data,
            Err(err) => {
                warn!("Unable to read resource[{}] for caching: {}", path, err);
                return;
            }
        };
        let cached = CachableResource {
            data,
            info: res.info.clone(),
        };
        match rmp_serde::to_vec(&cached) {
            Ok(encoded) => {
                self.store.insert(path.to_string(), Bytes::from(encoded));
                counter!(CACHE_ADMISSIONS_TOTAL).increment(1);
                debug!("saving {} to cache", path);
            }
            Err(err) => warn!("Unable to serialize resource[{}]: {}", path, err),
        }
    }

    /// Wrap a GetObject handler with cache lookup and admission.
    pub fn decorate(self: &Arc<Self>, inner: Handler) -> Handler {
        let cache = Arc::clone(self);
        handler_fn(move |path: String| {
            let inner = Arc::clone(&inner);
            let cache = Arc::clone(&cache);
            async move {
                if let Some(res) = cache.lookup(&path) {
                    counter!(CACHE_HITS_TOTAL).increment(1);
                    return Ok(res);
                }
                counter!(CACHE_MISSES_TOTAL).increment(1);

                let mut res = inner(path.clone()).await?;
                cache.admit(&path, &mut res).await;
                Ok(res)
            }
        })
    }
}

/// Install GetObject caching.
pub fn cache_extension(capacity: usize, max_size: u64, ttl: Duration) -> Extension {
    Box::new(move |builder: &mut PipelineBuilder| {
        let cache = Arc::new(ResourceCache::new(capacity, max_size, ttl));
        builder.apply_get_object(|h| cache.decorate(h))?;
        Ok("caching: enabled".to_string())
    })
}
