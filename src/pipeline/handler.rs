//! Handler types and the first-success chain.
//!
//! Handlers are plain closure values: a path goes in, a future resolving
//! to `Result<Resource, WebError>` comes out.  Decorators are functions
//! from one handler to another.  The serve and header-setter steps follow
//! the same shape for their own roles.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::http::HeaderMap;
use axum::response::Response;

use crate::errors::WebError;
use crate::resource::{Resource, ResourceInfo};

/// Future returned by a [`Handler`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Resource, WebError>> + Send>>;

/// Resolves a URL path to a [`Resource`].
pub type Handler = Arc<dyn Fn(String) -> HandlerFuture + Send + Sync>;

/// Future returned by a [`ServeHandler`].
pub type ServeFuture = Pin<Box<dyn Future<Output = Result<Response, WebError>> + Send>>;

/// Turns a resolved resource plus its prepared headers into a response.
pub type ServeHandler = Arc<dyn Fn(HeaderMap, Resource) -> ServeFuture + Send + Sync>;

/// Writes response headers derived from a resource's metadata.
pub type HeaderHandler = Arc<dyn Fn(&mut HeaderMap, &ResourceInfo) + Send + Sync>;

/// Wrap an async function as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resource, WebError>> + Send + 'static,
{
    Arc::new(move |path| Box::pin(f(path)))
}

/// Wrap an async function as a [`ServeHandler`].
pub fn serve_fn<F, Fut>(f: F) -> ServeHandler
where
    F: Fn(HeaderMap, Resource) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, WebError>> + Send + 'static,
{
    Arc::new(move |headers, resource| Box::pin(f(headers, resource)))
}

/// Chain handlers sequentially: the first success wins, and if every
/// handler fails the last failure is returned.
///
/// Returns `None` for an empty list and the handler itself for a list of
/// one.  Every handler receives the same original path.
pub fn chain_handlers(handlers: Vec<Handler>) -> Option<Handler> {
    if handlers.len() <= 1 {
        return handlers.into_iter().next();
    }
    let handlers: Arc<[Handler]> = handlers.into();
    Some(handler_fn(move |path: String| {
        let handlers = Arc::clone(&handlers);
        async move {
            let mut result = Err(WebError::NoHandlers { role: "chained" });
            for handler in handlers.iter() {
                result = handler(path.clone()).await;
                if result.is_ok() {
                    break;
                }
            }
            result
        }
    }))
}
