//! Prometheus metrics for minio-web.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides an axum middleware for request
//! metrics, and exposes the `/metrics` endpoint handler.  Without an
//! installed recorder every `counter!`/`histogram!` call is a no-op.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, status.
pub const HTTP_REQUESTS_TOTAL: &str = "minio_web_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, status.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "minio_web_http_request_duration_seconds";

/// GetObject requests answered from the cache (counter).
pub const CACHE_HITS_TOTAL: &str = "minio_web_cache_hits_total";

/// GetObject requests that missed the cache (counter).
pub const CACHE_MISSES_TOTAL: &str = "minio_web_cache_misses_total";

/// Resources written to the cache (counter).
pub const CACHE_ADMISSIONS_TOTAL: &str = "minio_web_cache_admissions_total";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent; later calls
/// return the handle installed by the first one.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(CACHE_HITS_TOTAL, "GetObject requests served from cache");
    describe_counter!(CACHE_MISSES_TOTAL, "GetObject requests that missed the cache");
    describe_counter!(CACHE_ADMISSIONS_TOTAL, "Resources admitted to the cache");
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware recording request count and latency by method and
/// status.  `/metrics` itself is not instrumented.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }
    let method = method_label(req.method().as_str());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method, "status" => status.clone()).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "status" => status)
        .record(duration);

    response
}

/// Collapse arbitrary methods into a bounded label set.
fn method_label(method: &str) -> &'static str {
    match method {
        "GET" => "GET",
        "HEAD" => "HEAD",
        _ => "OTHER",
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics`: render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// -- Tests --------------------------------------------------------------------
