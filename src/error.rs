//! Application error types for authproxy
//!
//! This module defines common error types used throughout the application.
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

use crate::config::ConfigError;
use crate::otel::OtelError;
use crate::server::ServerError;

/// Authentication and authorization errors
///
/// Every variant collapses to the same opaque 401 at the HTTP layer;
/// the distinction only matters for logging and for retry decisions.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    /// Missing or malformed Basic authorization header
    #[error("invalid or missing credentials")]
    NoCredentials,

    /// The backend does not know this user
    #[error("user not found")]
    UserNotFound,

    /// The backend knows the user but rejected the password
    #[error("bad password")]
    BadPassword,

    /// Credentials are valid but the host policy denies access
    #[error("access denied by configuration")]
    AccessDenied,

    /// Transient transport failure talking to a backend
    #[error("network error: {0}")]
    Network(String),

    /// Backend answered with something we cannot act on
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Backend failed without a specific reason
    #[error("unknown error")]
    Unknown,
}

/// Application-level error type
///
/// Aggregates the startup-time error types used by the binary.
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication error
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Server error
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// Telemetry error
    #[error("Telemetry error: {0}")]
    Otel(#[from] OtelError),
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    /// Returns true if the error is retryable
    fn is_retryable(&self) -> bool;
}

impl RetryableError for AuthError {
    fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Network(_))
    }
}
