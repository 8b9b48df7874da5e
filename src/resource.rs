//! Resource and metadata value objects flowing through the pipeline.
//!
//! A [`Resource`] owns a single-use byte stream.  Once a stage reads the
//! stream it is gone: there is no implicit rewind.  Any stage that needs
//! to look at the bytes (caching, markdown rendering) must call
//! [`Resource::materialize`], which reads the stream to completion and
//! installs a fresh in-memory reader over the captured bytes, so the
//! resource can still be handed on to the next stage.

use std::fmt;
use std::io::Cursor;
use std::pin::Pin;

use axum::body::Body;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::ReaderStream;

/// A lazily-read, single-use byte stream.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Metadata of a resolved resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// Object key in the backend (empty for synthetic resources).
    pub key: String,
    /// Size in bytes; 0 means empty or unknown.
    pub size: u64,
    /// Opaque validator string.
    pub etag: String,
    /// MIME type; empty means unknown.
    pub content_type: String,
    /// Last modification time, if known.
    pub last_modified: Option<DateTime<Utc>>,
}

/// A resolved object: metadata plus an optional byte stream.
///
/// Resources produced by a stat (HEAD) lookup carry no stream.
pub struct Resource {
    data: Option<ByteStream>,
    /// Metadata for the resource.
    pub info: ResourceInfo,
    /// Diagnostic message for logging; may be empty.
    pub msg: String,
}

impl Resource {
    /// Create a resource backed by an arbitrary async reader.
    pub fn new<R>(data: R, info: ResourceInfo) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            data: Some(Box::pin(data)),
            info,
            msg: String::new(),
        }
    }

    /// Create a resource over in-memory bytes.
    pub fn from_bytes(data: Bytes, info: ResourceInfo) -> Self {
        Self::new(Cursor::new(data), info)
    }

    /// Create a header-only resource (no stream).
    pub fn header_only(info: ResourceInfo) -> Self {
        Self {
            data: None,
            info,
            msg: String::new(),
        }
    }

    /// Attach a diagnostic message.
    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = msg.into();
        self
    }

    /// Whether the resource still holds a stream.
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Take the stream out of the resource, leaving it header-only.
    pub fn take_data(&mut self) -> Option<ByteStream> {
        self.data.take()
    }

    /// Read the stream to completion and replace it with an in-memory
    /// reader over the same bytes.
    ///
    /// A header-only resource materializes to empty bytes and stays
    /// header-only.  On a read error the bytes read so far are kept as
    /// the new stream and the error is returned.
    pub async fn materialize(&mut self) -> std::io::Result<Bytes> {
        let Some(mut stream) = self.data.take() else {
            return Ok(Bytes::new());
        };
        let mut buf = Vec::new();
        let result = stream.read_to_end(&mut buf).await;
        let bytes = Bytes::from(buf);
        self.data = Some(Box::pin(Cursor::new(bytes.clone())));
        result.map(|_| bytes)
    }

    /// Convert the stream into a streaming HTTP body.
    pub fn into_body(mut self) -> Body {
        match self.data.take() {
            Some(stream) => Body::from_stream(ReaderStream::new(stream)),
            None => Body::empty(),
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("has_data", &self.data.is_some())
            .field("info", &self.info)
            .field("msg", &self.msg)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(key: &str, size: u64) -> ResourceInfo {
        ResourceInfo {
            key: key.to_string(),
            size,
            etag: "\"abc\"".to_string(),
            content_type: "text/plain".to_string(),
            last_modified: None,
        }
    }

    #[tokio::test]
    async fn test_materialize_replaces_stream() {
        let mut res = Resource::from_bytes(Bytes::from_static(b"hello"), info("a.txt", 5));
        let first = res.materialize().await.unwrap();
        assert_eq!(first, Bytes::from_static(b"hello"));

        // Stream is still readable after materializing.
        let mut rest = Vec::new();
        res.take_data()
            .unwrap()
            .read_to_end(&mut rest)
            .await
            .unwrap();
        assert_eq!(rest, b"hello");
    }

    #[tokio::test]
    async fn test_materialize_twice_yields_same_bytes() {
        let mut res = Resource::from_bytes(Bytes::from_static(b"data"), info("a", 4));
        let a = res.materialize().await.unwrap();
        let b = res.materialize().await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_materialize_header_only() {
        let mut res = Resource::header_only(info("a", 10));
        let bytes = res.materialize().await.unwrap();
        assert!(bytes.is_empty());
        assert!(!res.has_data());
    }

    #[test]
    fn test_with_msg() {
        let res = Resource::header_only(ResourceInfo::default()).with_msg("StatObject ok");
        assert_eq!(res.msg, "StatObject ok");
    }

    #[test]
    fn test_debug_hides_stream() {
        let res = Resource::from_bytes(Bytes::from_static(b"x"), info("k", 1));
        let dbg = format!("{res:?}");
        assert!(dbg.contains("has_data: true"));
    }
}
