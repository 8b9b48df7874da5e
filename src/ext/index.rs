//! Default index files for directory-style requests.

use std::sync::Arc;

use crate::errors::WebError;
use crate::ext::Extension;
use crate::pipeline::{handler_fn, Handler, PipelineBuilder};

/// Index filename used when none is configured.
pub const DEFAULT_INDEX_FILE: &str = "index.html";

/// Candidate keys to try for a request path, in order.
///
/// Root requests try each index file at the root, paths ending in `/` try
/// each index file under that folder, and any other path is tried as-is
/// before falling back to `path/<index file>`.  Candidates carry no
/// leading slash.
pub fn index_candidates(path: &str, files: &[String]) -> Vec<String> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return files.to_vec();
    }
    if trimmed.ends_with('/') {
        return files.iter().map(|f| format!("{trimmed}{f}")).collect();
    }
    std::iter::once(trimmed.to_string())
        .chain(files.iter().map(|f| format!("{trimmed}/{f}")))
        .collect()
}

/// Wrap a handler so it retries each index candidate until one resolves.
pub fn index_decorator(files: Arc<[String]>) -> impl Fn(Handler) -> Handler {
    move |inner: Handler| {
        let files = Arc::clone(&files);
        handler_fn(move |path: String| {
            let inner = Arc::clone(&inner);
            let candidates = index_candidates(&path, &files);
            async move {
                let mut result = Err(WebError::NoSuchKey {
                    bucket: String::new(),
                    key: path,
                });
                for candidate in candidates {
                    result = inner(candidate).await;
                    if result.is_ok() {
                        break;
                    }
                }
                result
            }
        })
    }
}

/// Install index-file resolution on both the StatObject and GetObject
/// roles, so HEAD and GET agree.
pub fn index_extension(files: Vec<String>) -> Extension {
    Box::new(move |builder: &mut PipelineBuilder| {
        let files: Vec<String> = if files.is_empty() {
            vec![DEFAULT_INDEX_FILE.to_string()]
        } else {
            files
        };
        let msg = format!("default index file: {}", files.join(","));
        let decorate = index_decorator(files.into());
        builder.apply_stat_object(&decorate)?;
        builder.apply_get_object(&decorate)?;
        Ok(msg)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Resource, ResourceInfo};
    use std::sync::Mutex;

    fn files() -> Vec<String> {
        vec!["index.html".to_string(), "README.md".to_string()]
    }

    /// Records every path it sees and only resolves `accept`.
    fn recorder(log: Arc<Mutex<Vec<String>>>, accept: &'static str) -> Handler {
        handler_fn(move |path: String| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(path.clone());
                if path == accept {
                    Ok(Resource::header_only(ResourceInfo {
                        key: path,
                        ..Default::default()
                    }))
                } else {
                    Err(WebError::NoSuchKey {
                        bucket: "b".to_string(),
                        key: path,
                    })
                }
            }
        })
    }

    #[test]
    fn test_candidates_root() {
        assert_eq!(index_candidates("/", &files()), files());
        assert_eq!(index_candidates("", &files()), files());
    }

    #[test]
    fn test_candidates_folder() {
        assert_eq!(
            index_candidates("/docs/", &files()),
            vec!["docs/index.html", "docs/README.md"]
        );
    }

    #[test]
    fn test_candidates_plain_path_tries_literal_first() {
        assert_eq!(
            index_candidates("/a/b", &files()),
            vec!["a/b", "a/b/index.html", "a/b/README.md"]
        );
    }

    #[tokio::test]
    async fn test_decorator_tries_candidates_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let decorated = index_decorator(files().into())(recorder(Arc::clone(&log), "README.md"));

        let res = decorated("/".to_string()).await.unwrap();
        assert_eq!(res.info.key, "README.md");
        assert_eq!(*log.lock().unwrap(), vec!["index.html", "README.md"]);
    }

    #[tokio::test]
    async fn test_decorator_exact_key_wins() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let decorated = index_decorator(files().into())(recorder(Arc::clone(&log), "a/b"));

        decorated("/a/b".to_string()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a/b"]);
    }

    #[tokio::test]
    async fn test_decorator_returns_last_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let decorated = index_decorator(files().into())(recorder(Arc::clone(&log), "never"));

        match decorated("/docs/".to_string()).await.unwrap_err() {
            WebError::NoSuchKey { key, .. } => assert_eq!(key, "docs/README.md"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_extension_requires_handlers() {
        let mut builder = PipelineBuilder::new();
        assert!(index_extension(files())(&mut builder).is_err());
    }

    #[test]
    fn test_extension_message_defaults() {
        let mut builder = PipelineBuilder::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        builder
            .chain_stat_object(recorder(Arc::clone(&log), "index.html"))
            .chain_get_object(recorder(log, "index.html"));
        let msg = index_extension(Vec::new())(&mut builder).unwrap();
        assert_eq!(msg, "default index file: index.html");
    }
}
