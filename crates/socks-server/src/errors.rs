//! Error types for the relay core.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::ids::ConnectionId;

/// Registry mutation failures.
///
/// `InvalidInterest` is a client-visible condition; the other two are caller
/// bugs and are logged, never shown to clients.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// An empty channel set was supplied.
    #[error("channel set must not be empty")]
    InvalidInterest,
    /// `register` was called twice for the same connection.
    #[error("connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),
    /// `update_interest` was called for a connection that is not registered.
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),
}

/// Publish request rejections. No side effects happen for either.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PublishError {
    /// Missing or mismatched `Authorization` header.
    #[error("unauthorized")]
    Unauthorized,
    /// Body is not JSON or lacks non-empty `channels` / `event`.
    #[error("bad request: {0}")]
    BadRequest(&'static str),
}

impl PublishError {
    /// HTTP status for this rejection.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::BadRequest(_) => "bad_request",
        }
    }
}

impl IntoResponse for PublishError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Certificate loading failures.
#[derive(Debug, Error)]
pub enum TlsError {
    /// A PEM file could not be read or parsed.
    #[error("failed to load {path}: {message}")]
    Pem {
        /// File that failed.
        path: String,
        /// Parser message.
        message: String,
    },
    /// The file held no certificates.
    #[error("no certificates found in {0}")]
    NoCertificates(String),
    /// rustls rejected the certificate/key pair.
    #[error("invalid TLS configuration: {0}")]
    Config(#[from] rustls::Error),
}

/// Server startup failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or querying the listener failed.
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
    /// TLS material was present but unusable.
    #[error(transparent)]
    Tls(#[from] TlsError),
}
