//! Fallback favicon served when the store has none.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::warn;

use crate::errors::WebError;
use crate::ext::Extension;
use crate::pipeline::{handler_fn, Handler, PipelineBuilder};
use crate::resource::{Resource, ResourceInfo};

const FAVICON_NAME: &str = "favicon.ico";
const FAVICON_CONTENT_TYPE: &str = "image/x-icon";

/// Fallback favicon bytes, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Favicon {
    data: Bytes,
}

impl Favicon {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Read the favicon from disk.  `Ok(None)` if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>, WebError> {
        match std::fs::read(path.as_ref()) {
            Ok(data) => Ok(Some(Self::new(data))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Whether the path's last segment, ignoring trailing slashes, is
    /// `favicon.ico` (any case) and there is something to serve.
    pub fn matches(&self, path: &str) -> bool {
        if self.data.is_empty() {
            return false;
        }
        let path = path.trim_end_matches('/');
        let name = path.rsplit('/').next().unwrap_or(path);
        name.eq_ignore_ascii_case(FAVICON_NAME)
    }

    /// The synthesized favicon resource.
    pub fn resource(&self) -> Resource {
        let info = ResourceInfo {
            key: FAVICON_NAME.to_string(),
            size: self.data.len() as u64,
            content_type: FAVICON_CONTENT_TYPE.to_string(),
            ..Default::default()
        };
        Resource::from_bytes(self.data.clone(), info).with_msg("default favicon")
    }

    /// Delegate first; on failure, answer favicon requests with the
    /// fallback bytes and propagate everything else.
    pub fn decorate(self: &Arc<Self>, inner: Handler) -> Handler {
        let favicon = Arc::clone(self);
        handler_fn(move |path: String| {
            let inner = Arc::clone(&inner);
            let favicon = Arc::clone(&favicon);
            async move {
                match inner(path.clone()).await {
                    Ok(res) => Ok(res),
                    Err(_) if favicon.matches(&path) => Ok(favicon.resource()),
                    Err(err) => Err(err),
                }
            }
        })
    }
}

/// Install the fallback favicon on both resolution roles.
///
/// A missing file disables the extension; any other read error aborts
/// startup.
pub fn favicon_extension(path: String) -> Extension {
    Box::new(move |builder: &mut PipelineBuilder| {
        let Some(favicon) = Favicon::load(&path)? else {
            warn!("Favicon file {} not found", path);
            return Ok("default favicon: disabled".to_string());
        };
        let favicon = Arc::new(favicon);
        builder.apply_stat_object(|h| favicon.decorate(h))?;
        builder.apply_get_object(|h| favicon.decorate(h))?;
        Ok("default favicon: enabled".to_string())
    })
}
