//! Error types for the relay.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while relaying DNS queries.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTPS transport failure (DNS, connect, TLS, read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream resolver failure. Details are only logged.
    #[error("Resolver error")]
    Resolver,

    /// The caller-supplied deadline elapsed.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed DNS-JSON response body.
    #[error("Malformed DNS-JSON response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Invalid startup configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
