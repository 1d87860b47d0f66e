//! Error types for the computer API proxy

use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Result type alias for the computer API proxy
pub type Result<T> = std::result::Result<T, Error>;

/// Computer API proxy errors
///
/// Every variant resolves to exactly one response status via
/// [`Error::status_code`]; the response body never carries the message.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Client certificate absent, unparsable, or not issued by the trust anchor
    #[error("Untrusted client certificate: {0}")]
    Untrusted(String),

    /// Path matches no allow-listed resource, or the method is not permitted
    #[error("No route: {0}")]
    NoRoute(String),

    /// Certificate identity is not registered to the addressed computer record
    #[error("Certificate not bound to record: {0}")]
    Unbound(String),

    /// Token fetch, record lookup, or forwarding call failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Inbound body exceeds the configured limit
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge {
        /// Configured limit in bytes
        limit: usize,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map the error to the status code returned to the caller.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Untrusted(_) | Self::Unbound(_) => StatusCode::UNAUTHORIZED,
            Self::NoRoute(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match status {
            StatusCode::UNAUTHORIZED => "Unauthorized",
            StatusCode::NOT_FOUND => "Not Found",
            StatusCode::PAYLOAD_TOO_LARGE => "Payload Too Large",
            _ => "Internal Server Error",
        };
        (status, body).into_response()
    }
}
