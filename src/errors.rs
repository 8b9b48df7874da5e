//! Pipeline error types.
//!
//! Every failure a handler, decorator or serve step can produce is a
//! [`WebError`].  Resolution failures map to 404, serve failures map to
//! 500.  The enum implements [`axum::response::IntoResponse`] so the
//! dispatch layer can return the error text as the response body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Errors raised while resolving or serving a resource.
#[derive(Debug, Error)]
pub enum WebError {
    /// No bucket could be derived from the request path.
    #[error("Bucket name not known")]
    BucketNotKnown { path: String },

    /// The backend has no object (or listing) for the bucket/key.
    #[error("The specified key does not exist: {bucket}/{key}")]
    NoSuchKey { bucket: String, key: String },

    /// A pipeline role was built without any handler.
    #[error("No {role} handler configured")]
    NoHandlers { role: &'static str },

    /// HTTP method other than GET or HEAD.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// A listing filter is not a valid glob pattern.
    #[error("Invalid listing filter: {0}")]
    InvalidPattern(#[from] glob::PatternError),

    /// Template parsing or rendering failed.
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    /// Reading a resource stream or a local file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The object store returned an error.
    #[error("{0}")]
    Backend(#[from] anyhow::Error),
}

impl WebError {
    /// Return the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebError::BucketNotKnown { .. } => StatusCode::NOT_FOUND,
            WebError::NoSuchKey { .. } => StatusCode::NOT_FOUND,
            WebError::Backend(_) => StatusCode::NOT_FOUND,
            WebError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            WebError::NoHandlers { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            WebError::InvalidPattern(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WebError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WebError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::NOT_FOUND || status == StatusCode::METHOD_NOT_ALLOWED {
            return status.into_response();
        }
        (
            status,
            [("content-type", "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_is_16_hex_chars() {
        let id = generate_request_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_resolution_errors_map_to_404() {
        let bucket = WebError::BucketNotKnown {
            path: "/".to_string(),
        };
        assert_eq!(bucket.status_code(), StatusCode::NOT_FOUND);
        let backend = WebError::Backend(anyhow::anyhow!("connection refused"));
        assert_eq!(backend.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_serve_errors_map_to_500() {
        let io = WebError::Io(std::io::Error::other("broken pipe"));
        assert_eq!(io.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            WebError::NoHandlers { role: "GetObject" }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_method_not_allowed_is_405() {
        let resp = WebError::MethodNotAllowed.into_response();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_serve_error_response_carries_message() {
        let resp = WebError::Io(std::io::Error::other("stream reset")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/plain; charset=utf-8"
        );
    }
}
