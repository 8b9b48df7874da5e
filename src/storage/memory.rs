//! In-memory object store.
//!
//! Buckets and objects live in a `tokio::sync::RwLock<HashMap<...>>`.
//! Keys inside a bucket are kept in a `BTreeMap` so prefix listings come
//! back in lexical order, the way S3 returns them.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::io::Cursor;
use std::pin::Pin;

use super::backend::{ListEntry, ObjectStore};
use crate::resource::{ByteStream, ResourceInfo};

/// A stored object with its metadata.
#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    content_type: String,
    last_modified: DateTime<Utc>,
}

/// In-memory object store.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    /// bucket -> (key -> object)
    buckets: tokio::sync::RwLock<HashMap<String, BTreeMap<String, StoredObject>>>,
}

impl MemoryBackend {
    /// Create an empty store with no buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the quoted MD5-hex ETag for a byte slice.
    fn compute_etag(data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        format!("\"{}\"", hex::encode(hasher.finalize()))
    }

    /// Create a bucket.  Creating an existing bucket is a no-op.
    pub async fn create_bucket(&self, bucket: &str) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
    }

    /// Store an object, returning its ETag.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        content_type: &str,
    ) -> anyhow::Result<String> {
        let data = data.into();
        let etag = Self::compute_etag(&data);
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| anyhow::anyhow!("The specified bucket does not exist: {bucket}"))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                etag: etag.clone(),
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
        Ok(etag)
    }

    /// Remove an object.  Removing a missing object is a no-op.
    pub async fn delete_object(&self, bucket: &str, key: &str) {
        if let Some(objects) = self.buckets.write().await.get_mut(bucket) {
            objects.remove(key);
        }
    }

    async fn lookup(&self, bucket: &str, key: &str) -> anyhow::Result<StoredObject> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| anyhow::anyhow!("The specified bucket does not exist: {bucket}"))?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("The specified key does not exist: {bucket}/{key}"))
    }
}

impl ObjectStore for MemoryBackend {
    fn stat_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ResourceInfo>> + Send + '_>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let obj = self.lookup(&bucket, &key).await?;
            Ok(ResourceInfo {
                key,
                size: obj.data.len() as u64,
                etag: obj.etag,
                content_type: obj.content_type,
                last_modified: Some(obj.last_modified),
            })
        })
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ByteStream>> + Send + '_>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let obj = self.lookup(&bucket, &key).await?;
            let stream: ByteStream = Box::pin(Cursor::new(obj.data));
            Ok(stream)
        })
    }

    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<ListEntry>>> + Send + '_>> {
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();
        Box::pin(async move {
            let buckets = self.buckets.read().await;
            let objects = buckets
                .get(&bucket)
                .ok_or_else(|| anyhow::anyhow!("The specified bucket does not exist: {bucket}"))?;

            let mut folders = BTreeSet::new();
            let mut entries = Vec::new();
            for (key, obj) in objects.range(prefix.clone()..) {
                let Some(rest) = key.strip_prefix(prefix.as_str()) else {
                    break;
                };
                match rest.find('/') {
                    Some(idx) => {
                        folders.insert(format!("{prefix}{}", &rest[..=idx]));
                    }
                    None => entries.push(ListEntry {
                        key: key.clone(),
                        size: obj.data.len() as u64,
                        last_modified: Some(obj.last_modified),
                    }),
                }
            }

            entries.extend(folders.into_iter().map(|key| ListEntry {
                key,
                size: 0,
                last_modified: None,
            }));
            entries.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(entries)
        })
    }

    fn bucket_exists(
        &self,
        bucket: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let bucket = bucket.to_string();
        Box::pin(async move { Ok(self.buckets.read().await.contains_key(&bucket)) })
    }

    fn list_buckets(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<String>>> + Send + '_>> {
        Box::pin(async move {
            let mut names: Vec<String> = self.buckets.read().await.keys().cloned().collect();
            names.sort();
            Ok(names)
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
