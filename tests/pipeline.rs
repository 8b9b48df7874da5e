//! End-to-end tests: router + pipeline + every extension over the
//! in-memory backend.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use minio_web::app::build_pipeline;
use minio_web::config::ExtensionsConfig;
use minio_web::storage::{MemoryBackend, ObjectStore};
use minio_web::AppState;

const FAVICON: &[u8] = &[0, 0, 1, 0, 1, 0, 16, 16];

struct Fixture {
    router: Router,
    store: Arc<MemoryBackend>,
    _dir: TempDir,
}

async fn fixture() -> Fixture {
    let store = Arc::new(MemoryBackend::new());
    store.create_bucket("site").await;
    for (key, body, content_type) in [
        ("index.html", "<h1>home</h1>", "text/html"),
        ("docs/README.md", "# Docs\n\nWelcome.", "text/markdown"),
        ("docs/guide.md", "# Guide", "text/markdown"),
        ("data.json", "{\"ok\":true}", ""),
        ("my file.txt", "spaced", "text/plain"),
        ("notes/a.txt", "plain note", "text/plain"),
        ("notes/sub/x.md", "# x", "text/markdown"),
        ("notes/.secret", "hidden", "text/plain"),
    ] {
        store.put_object("site", key, body, content_type).await.unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    let favicon = dir.path().join("favicon.ico");
    std::fs::write(&favicon, FAVICON).unwrap();
    let template = dir.path().join("markdown.html");
    std::fs::write(&template, "<html><body>{{ content }}</body></html>").unwrap();

    let config = ExtensionsConfig {
        bucket_name: "site".to_string(),
        default_html: "index.html, README.md".to_string(),
        favicon: favicon.to_string_lossy().to_string(),
        markdown_template: template.to_string_lossy().to_string(),
        list_folder: true,
        list_folder_objects: "*.md".to_string(),
        cache_size: 100,
        ..Default::default()
    };
    let backend: Arc<dyn ObjectStore> = store.clone();
    let pipeline = build_pipeline(&config, backend).unwrap();
    let router = minio_web::server::app(Arc::new(AppState { pipeline }), false);

    Fixture {
        router,
        store,
        _dir: dir,
    }
}

async fn send(router: &Router, method: &str, uri: &str) -> (StatusCode, axum::http::HeaderMap, String) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, headers, String::from_utf8_lossy(&body).to_string())
}

#[tokio::test]
async fn test_get_root_serves_index() {
    let fx = fixture().await;
    let (status, headers, body) = send(&fx.router, "GET", "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<h1>home</h1>");
    assert_eq!(headers["content-type"], "text/html");
    assert_eq!(headers["content-length"], "13");
    assert!(headers.contains_key("etag"));
    assert!(headers.contains_key("last-modified"));
    assert_eq!(headers["server"], "minio-web");
    assert_eq!(headers["x-request-id"].len(), 16);
}

#[tokio::test]
async fn test_head_matches_get_without_body() {
    let fx = fixture().await;
    let (status, headers, body) = send(&fx.router, "HEAD", "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    assert_eq!(headers["content-type"], "text/html");
    assert_eq!(headers["content-length"], "13");
}

#[tokio::test]
async fn test_missing_object_is_404() {
    let fx = fixture().await;
    let (status, _, _) = send(&fx.router, "GET", "/missing.txt").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = send(&fx.router, "HEAD", "/missing.txt").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_other_methods_are_405() {
    let fx = fixture().await;
    for method in ["POST", "PUT", "DELETE"] {
        let (status, _, _) = send(&fx.router, method, "/index.html").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method}");
    }
}

#[tokio::test]
async fn test_fallback_favicon() {
    let fx = fixture().await;
    let (status, headers, _) = send(&fx.router, "GET", "/favicon.ico").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "image/x-icon");
    assert_eq!(headers["content-length"], FAVICON.len().to_string());

    let (status, headers, _) = send(&fx.router, "HEAD", "/favicon.ico").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "image/x-icon");
}

#[tokio::test]
async fn test_folder_index_is_rendered_markdown() {
    let fx = fixture().await;
    let (status, headers, body) = send(&fx.router, "GET", "/docs/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "text/html; charset=utf-8");
    assert_eq!(headers["content-length"], body.len().to_string());
    assert!(body.starts_with("<html><body><h1>Docs</h1>"));
}

#[tokio::test]
async fn test_folder_without_index_is_listed() {
    let fx = fixture().await;
    let (status, headers, body) = send(&fx.router, "GET", "/notes/").await;
    assert_eq!(status, StatusCode::OK);
    // Listings are markdown, so they go through the markdown renderer too.
    assert_eq!(headers["content-type"], "text/html; charset=utf-8");
    assert!(body.contains("sub/"));
    assert!(!body.contains("a.txt"));
    assert!(!body.contains(".secret"));
}

#[tokio::test]
async fn test_empty_folder_listing_is_404() {
    let fx = fixture().await;
    let (status, _, _) = send(&fx.router, "GET", "/nothing/here/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cached_object_survives_backend_delete() {
    let fx = fixture().await;
    let (status, _, first) = send(&fx.router, "GET", "/data.json").await;
    assert_eq!(status, StatusCode::OK);

    fx.store.delete_object("site", "data.json").await;

    let (status, headers, second) = send(&fx.router, "GET", "/data.json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, second);
    assert_eq!(headers["content-type"], "application/json");

    // HEAD is never cached.
    let (status, _, _) = send(&fx.router, "HEAD", "/data.json").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_percent_encoded_path() {
    let fx = fixture().await;
    let (status, _, body) = send(&fx.router, "GET", "/my%20file.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "spaced");
}
