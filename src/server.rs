//! Axum router construction and the connection accept loop.
//!
//! Every request path is handed to the [`Pipeline`](crate::pipeline::Pipeline)
//! through a single fallback handler; only `/metrics` is routed separately
//! when metrics are enabled.  Connections are served by a hyper-util accept
//! loop, optionally behind rustls, and drained on SIGINT/SIGTERM.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::{
    extract::State,
    http::{HeaderValue, Method, Request, Uri},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use percent_encoding::percent_decode_str;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::{ServerConfig, SslConfig};
use crate::errors::generate_request_id;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

/// Value of the `Server` response header.
const SERVER_NAME: &str = "minio-web";

/// Build the axum [`Router`].
///
/// With `metrics` set, `GET /metrics` is served and every request is
/// instrumented.
pub fn app(state: Arc<AppState>, metrics: bool) -> Router {
    let mut router = Router::new();
    if metrics {
        router = router.route("/metrics", get(metrics_handler));
    }
    let router = router
        .fallback(dispatch)
        .with_state(state)
        // common_headers_middleware is inner (adds x-request-id and server).
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(TraceLayer::new_for_http());
    if metrics {
        // metrics_middleware is outer (captures full request lifecycle).
        router.layer(middleware::from_fn(metrics_middleware))
    } else {
        router
    }
}

/// Percent-decode a request path.  Invalid UTF-8 is replaced lossily.
pub fn decode_path(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

async fn dispatch(State(state): State<Arc<AppState>>, method: Method, uri: Uri) -> Response {
    let path = decode_path(uri.path());
    state.pipeline.handle(&method, path).await
}

// -- Common headers middleware -----------------------------------------------

/// Adds common response headers to every response:
/// - `x-request-id`: 16-character uppercase hex string
/// - `Date`: RFC 7231 formatted timestamp
/// - `Server`: `minio-web`
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(val) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", val);
        }
    }
    if let Ok(val) = HeaderValue::from_str(&httpdate::fmt_http_date(SystemTime::now())) {
        headers.insert("date", val);
    }
    headers.insert("server", HeaderValue::from_static(SERVER_NAME));

    response
}

// -- TLS ---------------------------------------------------------------------

/// Load a PEM certificate chain and private key into a rustls acceptor.
pub fn load_tls_acceptor(ssl: &SslConfig) -> anyhow::Result<TlsAcceptor> {
    let mut cert_reader = BufReader::new(File::open(&ssl.cert)?);
    let cert_chain = rustls_pemfile::certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;
    if cert_chain.is_empty() {
        anyhow::bail!("no certificates found in {}", ssl.cert);
    }

    let mut key_reader = BufReader::new(File::open(&ssl.key)?);
    let key = rustls_pemfile::private_key(&mut key_reader)?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {}", ssl.key))?;

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

// -- Serving -----------------------------------------------------------------

/// Bind the configured address and serve `app` until a shutdown signal.
///
/// HTTPS is used when both a certificate and a key are configured.
pub async fn serve(app: Router, config: &ServerConfig) -> anyhow::Result<()> {
    let tls = if config.ssl.enabled() {
        Some(load_tls_acceptor(&config.ssl)?)
    } else {
        None
    };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    let scheme = if tls.is_some() { "https" } else { "http" };
    info!("minio-web listening on {}://{}", scheme, addr);

    run(
        listener,
        app,
        tls,
        Duration::from_secs(config.shutdown_timeout),
    )
    .await
}

/// Run the accept loop until a shutdown signal, then wait up to
/// `drain_timeout` for in-flight connections.
async fn run(
    listener: TcpListener,
    app: Router,
    tls: Option<TlsAcceptor>,
    drain_timeout: Duration,
) -> anyhow::Result<()> {
    let graceful = GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let service = TowerToHyperService::new(app.clone());
                let http = http.clone();
                let watcher = graceful.watcher();
                let tls = tls.clone();

                tokio::spawn(async move {
                    let result = match tls {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(stream) => {
                                let conn = http.serve_connection(TokioIo::new(stream), service);
                                watcher.watch(conn.into_owned()).await
                            }
                            Err(e) => {
                                debug!(peer_addr = %peer_addr, error = %e, "TLS handshake failed");
                                return;
                            }
                        },
                        None => {
                            let conn = http.serve_connection(TokioIo::new(stream), service);
                            watcher.watch(conn.into_owned()).await
                        }
                    };
                    if let Err(e) = result {
                        debug!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    match tokio::time::timeout(drain_timeout, graceful.shutdown()).await {
        Ok(()) => info!("all connections drained"),
        Err(_) => warn!(
            "connections still open after {}s, exiting",
            drain_timeout.as_secs()
        ),
    }
    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_path_plain() {
        assert_eq!(decode_path("/bucket/a/b.txt"), "/bucket/a/b.txt");
    }

    #[test]
    fn test_decode_path_percent_encoded() {
        assert_eq!(decode_path("/my%20docs/caf%C3%A9.md"), "/my docs/café.md");
    }

    #[test]
    fn test_decode_path_invalid_utf8_is_lossy() {
        assert_eq!(decode_path("/a%FFb"), "/a\u{FFFD}b");
    }

    #[test]
    fn test_load_tls_acceptor_missing_files() {
        let ssl = SslConfig {
            cert: "/nonexistent/cert.pem".to_string(),
            key: "/nonexistent/key.pem".to_string(),
        };
        assert!(load_tls_acceptor(&ssl).is_err());
    }

    #[test]
    fn test_load_tls_acceptor_empty_cert() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, "").unwrap();
        std::fs::write(&key, "").unwrap();
        let ssl = SslConfig {
            cert: cert.to_string_lossy().to_string(),
            key: key.to_string_lossy().to_string(),
        };
        let err = load_tls_acceptor(&ssl).err().expect("expected error");
        assert!(err.to_string().contains("no certificates"));
    }
}
