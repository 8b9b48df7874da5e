//! The request-resolution pipeline.
//!
//! A [`PipelineBuilder`] accumulates handlers for the two resolution roles
//! (StatObject for HEAD, GetObject for GET), decorators over them, and
//! decorators over the serve and header-setter steps.  Extensions are
//! installed against the builder in order.  [`PipelineBuilder::build`]
//! collapses each chain into a single handler and yields an immutable
//! [`Pipeline`] that the HTTP layer shares across requests.

pub mod handler;

use std::time::SystemTime;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{error, info};

pub use handler::{
    chain_handlers, handler_fn, serve_fn, Handler, HandlerFuture, HeaderHandler, ServeFuture,
    ServeHandler,
};

use crate::errors::WebError;
use crate::ext::Extension;
use crate::resource::{Resource, ResourceInfo};
use std::sync::Arc;

/// Fallback content type when neither the backend nor the key says more.
const OCTET_STREAM: &str = "application/octet-stream";

/// Set `Content-Type`, `ETag`, `Last-Modified` and `Content-Length` from
/// the resource metadata.
///
/// An empty content type is guessed from the key extension.  Unknown
/// ETag and last-modified values are omitted.
pub fn set_default_headers(headers: &mut HeaderMap, info: &ResourceInfo) {
    let content_type = if info.content_type.is_empty() {
        mime_guess::from_path(&info.key)
            .first_raw()
            .unwrap_or(OCTET_STREAM)
            .to_string()
    } else {
        info.content_type.clone()
    };
    headers.insert(
        "content-type",
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(OCTET_STREAM)),
    );

    if !info.etag.is_empty() {
        if let Ok(val) = HeaderValue::from_str(&info.etag) {
            headers.insert("etag", val);
        }
    }

    if let Some(last_modified) = info.last_modified {
        let date = httpdate::fmt_http_date(SystemTime::from(last_modified));
        if let Ok(val) = HeaderValue::from_str(&date) {
            headers.insert("last-modified", val);
        }
    }

    headers.insert("content-length", HeaderValue::from(info.size));
}

/// Stream the resource body with the prepared headers.
///
/// A resource without a stream is answered with 404.
pub fn default_serve() -> ServeHandler {
    serve_fn(|headers: HeaderMap, resource: Resource| async move {
        if !resource.has_data() {
            return Ok(StatusCode::NOT_FOUND.into_response());
        }
        let mut response = Response::new(resource.into_body());
        *response.headers_mut() = headers;
        Ok(response)
    })
}

/// Accumulates handlers and decorators before the pipeline is frozen.
pub struct PipelineBuilder {
    stat_objects: Vec<Handler>,
    get_objects: Vec<Handler>,
    serve: ServeHandler,
    set_headers: HeaderHandler,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    /// Create a builder with no resolution handlers, the default serve
    /// step and the default header-setter.
    pub fn new() -> Self {
        Self {
            stat_objects: Vec::new(),
            get_objects: Vec::new(),
            serve: default_serve(),
            set_headers: Arc::new(set_default_headers),
        }
    }

    /// Append a StatObject handler to the chain.
    pub fn chain_stat_object(&mut self, handler: Handler) -> &mut Self {
        self.stat_objects.push(handler);
        self
    }

    /// Append a GetObject handler to the chain.
    pub fn chain_get_object(&mut self, handler: Handler) -> &mut Self {
        self.get_objects.push(handler);
        self
    }

    /// Decorate the current StatObject chain.
    ///
    /// The chain accumulated so far is collapsed into one handler, which
    /// the decorator wraps.  Fails if no StatObject handler exists yet.
    pub fn apply_stat_object<D>(&mut self, decorator: D) -> Result<&mut Self, WebError>
    where
        D: FnOnce(Handler) -> Handler,
    {
        let current = chain_handlers(std::mem::take(&mut self.stat_objects))
            .ok_or(WebError::NoHandlers { role: "StatObject" })?;
        self.stat_objects = vec![decorator(current)];
        Ok(self)
    }

    /// Decorate the current GetObject chain.
    ///
    /// The chain accumulated so far is collapsed into one handler, which
    /// the decorator wraps.  Fails if no GetObject handler exists yet.
    pub fn apply_get_object<D>(&mut self, decorator: D) -> Result<&mut Self, WebError>
    where
        D: FnOnce(Handler) -> Handler,
    {
        let current = chain_handlers(std::mem::take(&mut self.get_objects))
            .ok_or(WebError::NoHandlers { role: "GetObject" })?;
        self.get_objects = vec![decorator(current)];
        Ok(self)
    }

    /// Decorate the serve step.
    pub fn apply_serve<D>(&mut self, decorator: D) -> &mut Self
    where
        D: FnOnce(ServeHandler) -> ServeHandler,
    {
        self.serve = decorator(self.serve.clone());
        self
    }

    /// Decorate the header-setter step.
    pub fn apply_headers<D>(&mut self, decorator: D) -> &mut Self
    where
        D: FnOnce(HeaderHandler) -> HeaderHandler,
    {
        self.set_headers = decorator(self.set_headers.clone());
        self
    }

    /// Install an extension and log its status message.
    pub fn apply_extension(&mut self, extension: Extension) -> Result<&mut Self, WebError> {
        let msg = extension(self)?;
        info!("{}", msg);
        Ok(self)
    }

    /// Freeze the builder into a [`Pipeline`].
    ///
    /// Fails if either resolution role has no handler.
    pub fn build(self) -> Result<Pipeline, WebError> {
        let stat_object =
            chain_handlers(self.stat_objects).ok_or(WebError::NoHandlers { role: "StatObject" })?;
        let get_object =
            chain_handlers(self.get_objects).ok_or(WebError::NoHandlers { role: "GetObject" })?;
        Ok(Pipeline {
            stat_object,
            get_object,
            serve: self.serve,
            set_headers: self.set_headers,
        })
    }
}

/// The frozen pipeline shared by every request.
#[derive(Clone)]
pub struct Pipeline {
    stat_object: Handler,
    get_object: Handler,
    serve: ServeHandler,
    set_headers: HeaderHandler,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Handle one request: HEAD resolves metadata only, GET resolves and
    /// serves the body, anything else is 405.
    pub async fn handle(&self, method: &Method, path: String) -> Response {
        match *method {
            Method::HEAD => self.head(path).await,
            Method::GET => self.get(path).await,
            _ => WebError::MethodNotAllowed.into_response(),
        }
    }

    /// Resolve a path with the StatObject handler.
    pub async fn stat_object(&self, path: String) -> Result<Resource, WebError> {
        (self.stat_object)(path).await
    }

    /// Resolve a path with the GetObject handler.
    pub async fn get_object(&self, path: String) -> Result<Resource, WebError> {
        (self.get_object)(path).await
    }

    async fn head(&self, path: String) -> Response {
        let res = match self.stat_object(path.clone()).await {
            Ok(res) => res,
            Err(err) => {
                error!("HEAD[{}] [404]: {}", path, err);
                return StatusCode::NOT_FOUND.into_response();
            }
        };
        if !res.msg.is_empty() {
            info!("{}", res.msg);
        }

        let mut response = Response::new(Body::empty());
        (self.set_headers)(response.headers_mut(), &res.info);
        response
    }

    async fn get(&self, path: String) -> Response {
        let res = match self.get_object(path.clone()).await {
            Ok(res) => res,
            Err(err) => {
                error!("GET[{}] [404]: {}", path, err);
                return StatusCode::NOT_FOUND.into_response();
            }
        };
        if !res.msg.is_empty() {
            info!("{}", res.msg);
        }

        let mut headers = HeaderMap::new();
        (self.set_headers)(&mut headers, &res.info);
        let key = res.info.key.clone();

        match (self.serve)(headers, res).await {
            Ok(response) => {
                info!("GET[{}] [200]: ok", key);
                response
            }
            Err(err) => {
                error!("Serve[{}] [500]: {}", path, err);
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
            }
        }
    }
}
