//! Markdown listings of pseudo-folders.
//!
//! Appended as the last GetObject handler: a path that resolves to no
//! object is listed non-recursively instead.  Hidden entries (local name
//! starting with `.`) are skipped.  Sub-folders are always shown; objects
//! only when their local name matches the configured glob.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use glob::Pattern;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Serialize;
use tera::{Context, Tera};

use crate::errors::WebError;
use crate::ext::Extension;
use crate::pipeline::{handler_fn, Handler, PipelineBuilder};
use crate::resolver::Resolver;
use crate::resource::{Resource, ResourceInfo};
use crate::storage::ListEntry;

const LISTING_TEMPLATE_NAME: &str = "listing";

const LISTING_TEMPLATE: &str = r#"
## {{ bucket | escape }}{{ url | escape }}

| Name | Last Modified | Size |
| --- | --- | --- |
| <a href="..">. .</a> | | |
{% for item in items %}| <a href="{{ item.path }}">{{ item.name | escape }}</a> | {{ item.last_modified }} | {{ item.size }} |
{% endfor %}"#;

/// Bytes percent-encoded in item links.  `/` is kept so links stay
/// hierarchical; everything that could end the attribute or the table cell
/// is encoded.
const HREF_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

#[derive(Debug, Serialize)]
struct ListingItem {
    name: String,
    path: String,
    size: String,
    last_modified: String,
}

/// Lists folders (and optionally objects) under a resolved prefix.
pub struct FolderListing {
    resolver: Arc<Resolver>,
    pattern: Option<Pattern>,
    tera: Tera,
}

impl FolderListing {
    /// `objects` is a glob over local names; empty lists folders only.
    pub fn new(resolver: Arc<Resolver>, objects: &str) -> Result<Self, WebError> {
        let pattern = if objects.is_empty() {
            None
        } else {
            Some(Pattern::new(objects)?)
        };
        let mut tera = Tera::default();
        tera.add_raw_template(LISTING_TEMPLATE_NAME, LISTING_TEMPLATE)?;
        Ok(Self {
            resolver,
            pattern,
            tera,
        })
    }

    fn keep(&self, entry: &ListEntry, name: &str) -> bool {
        if name.is_empty() || name.starts_with('.') {
            return false;
        }
        entry.size == 0 || self.pattern.as_ref().is_some_and(|p| p.matches(name))
    }

    /// Render the listing for a path as a markdown resource.
    ///
    /// An unknown bucket, or a non-root folder with nothing to show, is a
    /// `NoSuchKey` failure.
    pub async fn list(&self, url: &str) -> Result<Resource, WebError> {
        let (bucket, mut prefix) = self.resolver.resolve(url)?;
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }

        let store = self.resolver.store();
        if !store.bucket_exists(&bucket).await? {
            return Err(WebError::NoSuchKey { bucket, key: prefix });
        }
        let entries = store.list_objects(&bucket, &prefix).await?;

        let base = if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{url}/")
        };
        let now = Utc::now();
        let items: Vec<ListingItem> = entries
            .iter()
            .filter_map(|entry| {
                let name = entry.key.strip_prefix(prefix.as_str()).unwrap_or(&entry.key);
                if !self.keep(entry, name) {
                    return None;
                }
                Some(ListingItem {
                    name: name.to_string(),
                    path: utf8_percent_encode(&format!("{base}{name}"), HREF_ENCODE_SET)
                        .to_string(),
                    size: if entry.size == 0 {
                        String::new()
                    } else {
                        humanize_bytes(entry.size)
                    },
                    last_modified: entry
                        .last_modified
                        .map(|t| humanize_time(t, now))
                        .unwrap_or_default(),
                })
            })
            .collect();

        let (_, local) = self.resolver.bucket_and_key(url);
        if items.is_empty() && !local.is_empty() {
            return Err(WebError::NoSuchKey { bucket, key: prefix });
        }

        let mut context = Context::new();
        context.insert("bucket", self.resolver.bucket());
        context.insert("url", url);
        context.insert("items", &items);
        let rendered = self.tera.render(LISTING_TEMPLATE_NAME, &context)?;

        let data = Bytes::from(rendered);
        let info = ResourceInfo {
            size: data.len() as u64,
            content_type: "text/markdown".to_string(),
            last_modified: Some(now),
            ..Default::default()
        };
        Ok(Resource::from_bytes(data, info)
            .with_msg(format!("ListObjects[{bucket}/{prefix}] ok: {} entries", items.len())))
    }

    /// The listing as a GetObject handler.
    pub fn handler(self: &Arc<Self>) -> Handler {
        let listing = Arc::clone(self);
        handler_fn(move |url: String| {
            let listing = Arc::clone(&listing);
            async move { listing.list(&url).await }
        })
    }
}

/// Install folder listings at the end of the GetObject chain.
pub fn listing_extension(resolver: Arc<Resolver>, objects: String) -> Extension {
    Box::new(move |builder: &mut PipelineBuilder| {
        let listing = Arc::new(FolderListing::new(resolver, &objects)?);
        builder.chain_get_object(listing.handler());
        Ok(format!("list folder objects: {objects}"))
    })
}

/// Format a byte count with SI units, e.g. `83 MB`, `1.5 kB`.
pub fn humanize_bytes(size: u64) -> String {
    const UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];
    if size < 10 {
        return format!("{size} B");
    }
    let mut exp = 0;
    let mut base = 1u64;
    while exp < UNITS.len() - 1 && size / base >= 1000 {
        base *= 1000;
        exp += 1;
    }
    let value = size as f64 / base as f64;
    if value < 10.0 {
        format!("{value:.1} {}", UNITS[exp])
    } else {
        format!("{value:.0} {}", UNITS[exp])
    }
}

/// Describe a timestamp relative to `now`, e.g. `3 minutes ago`.
pub fn humanize_time(time: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - time).num_seconds();
    let (amount, suffix) = if secs < 0 {
        (-secs, "from now")
    } else {
        (secs, "ago")
    };
    let (value, unit) = match amount {
        0 => return "now".to_string(),
        1..=59 => (amount, "second"),
        60..=3_599 => (amount / 60, "minute"),
        3_600..=86_399 => (amount / 3_600, "hour"),
        86_400..=2_591_999 => (amount / 86_400, "day"),
        2_592_000..=31_535_999 => (amount / 2_592_000, "month"),
        _ => (amount / 31_536_000, "year"),
    };
    let plural = if value == 1 { "" } else { "s" };
    format!("{value} {unit}{plural} {suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use chrono::Duration;

    async fn listing(bucket: &str, objects: &str) -> FolderListing {
        let store = Arc::new(MemoryBackend::new());
        store.create_bucket("site").await;
        for key in ["a.txt", "b/c.txt", ".hidden", "docs/guide.md", "docs/notes.txt"] {
            store
                .put_object("site", key, "content", "text/plain")
                .await
                .unwrap();
        }
        let resolver = Arc::new(Resolver::new(store, bucket, ""));
        FolderListing::new(resolver, objects).unwrap()
    }

    async fn render(listing: &FolderListing, url: &str) -> String {
        let mut res = listing.list(url).await.unwrap();
        let bytes = res.materialize().await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_folders_only_without_filter() {
        let listing = listing("site", "").await;
        let body = render(&listing, "/").await;
        assert!(body.contains(r#"<a href="/b/">b&#x2F;</a>"#));
        assert!(body.contains(r#"<a href="/docs/">docs&#x2F;</a>"#));
        assert!(!body.contains("a.txt"));
        assert!(!body.contains(".hidden"));
    }

    #[tokio::test]
    async fn test_glob_admits_matching_objects() {
        let listing = listing("site", "*.md").await;
        let body = render(&listing, "/docs/").await;
        assert!(body.contains(r#"<a href="/docs/guide.md">guide.md</a>"#));
        assert!(!body.contains("notes.txt"));
        assert!(body.contains("7 B"));
    }

    #[tokio::test]
    async fn test_resource_metadata() {
        let listing = listing("site", "").await;
        let res = listing.list("/").await.unwrap();
        assert_eq!(res.info.content_type, "text/markdown");
        assert!(res.info.last_modified.is_some());
        assert!(res.info.size > 0);
    }

    #[tokio::test]
    async fn test_heading_uses_static_bucket_and_url() {
        let listing = listing("site", "").await;
        let body = render(&listing, "/docs").await;
        assert!(body.contains("## site&#x2F;docs"));
    }

    #[tokio::test]
    async fn test_inferred_bucket() {
        let listing = listing("", "*").await;
        let body = render(&listing, "/site/").await;
        assert!(body.contains(r#"<a href="/site/a.txt">a.txt</a>"#));
    }

    #[tokio::test]
    async fn test_hostile_names_are_escaped() {
        let store = Arc::new(MemoryBackend::new());
        store.create_bucket("site").await;
        store
            .put_object("site", "<img src=x onerror=alert(1)>/f.txt", "x", "text/plain")
            .await
            .unwrap();
        let resolver = Arc::new(Resolver::new(store, "site", ""));
        let listing = FolderListing::new(resolver, "").unwrap();

        let body = render(&listing, "/").await;
        assert!(!body.contains("<img"));
        assert!(body.contains(r#"<a href="/%3Cimg%20src=x%20onerror=alert(1)%3E/">"#));
        assert!(body.contains("&lt;img src=x onerror=alert(1)&gt;&#x2F;</a>"));
    }

    #[tokio::test]
    async fn test_request_url_is_escaped_in_heading() {
        let store = Arc::new(MemoryBackend::new());
        store.create_bucket("site").await;
        store
            .put_object("site", "<b>x</b>/f.txt", "x", "text/plain")
            .await
            .unwrap();
        let resolver = Arc::new(Resolver::new(store, "site", ""));
        let listing = FolderListing::new(resolver, "*").unwrap();

        let body = render(&listing, "/<b>x</b>/").await;
        assert!(!body.contains("<b>"));
        assert!(body.contains("## site&#x2F;&lt;b&gt;x&lt;&#x2F;b&gt;&#x2F;"));
        assert!(body.contains(r#"<a href="/%3Cb%3Ex%3C/b%3E/f.txt">f.txt</a>"#));
    }

    #[tokio::test]
    async fn test_unknown_bucket_fails() {
        let listing = listing("", "").await;
        assert!(matches!(
            listing.list("/nope/").await,
            Err(WebError::NoSuchKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_subfolder_fails() {
        let listing = listing("site", "").await;
        assert!(matches!(
            listing.list("/missing/").await,
            Err(WebError::NoSuchKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_glob_is_rejected() {
        let store = Arc::new(MemoryBackend::new());
        let resolver = Arc::new(Resolver::new(store, "site", ""));
        assert!(matches!(
            FolderListing::new(resolver, "[unclosed"),
            Err(WebError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_humanize_bytes() {
        assert_eq!(humanize_bytes(7), "7 B");
        assert_eq!(humanize_bytes(1_500), "1.5 kB");
        assert_eq!(humanize_bytes(82_854_982), "83 MB");
        assert_eq!(humanize_bytes(999), "999 B");
        assert_eq!(humanize_bytes(1_000), "1.0 kB");
    }

    #[test]
    fn test_humanize_time() {
        let now = Utc::now();
        assert_eq!(humanize_time(now, now), "now");
        assert_eq!(humanize_time(now - Duration::seconds(1), now), "1 second ago");
        assert_eq!(humanize_time(now - Duration::minutes(5), now), "5 minutes ago");
        assert_eq!(humanize_time(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(humanize_time(now - Duration::days(400), now), "1 year ago");
        assert_eq!(humanize_time(now + Duration::hours(2), now), "2 hours from now");
    }
}
