//! Error types for gridcrawl
//!
//! Errors fall into three groups:
//! - per-cell fetch failures (transport, HTTP status, malformed body), which are
//!   retried and, once retries run out, contained at the task boundary
//! - persistence failures, which abort a run before coverage is written
//! - configuration errors, reported before any work starts

use std::time::Duration;
use thiserror::Error;

/// Result type alias for gridcrawl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for gridcrawl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "region.step")
        key: Option<String>,
    },

    /// Transport-level failure: timeout, connection refused, reset, TLS
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote source answered with a non-success status
    #[error("HTTP {status}")]
    HttpStatus {
        /// Status code returned by the server
        status: u16,
        /// Minimum wait requested by the server (429, 503 and 5xx only)
        retry_after: Option<Duration>,
    },

    /// Response body could not be parsed as the expected structure
    #[error("malformed response: {0}")]
    Parse(String),

    /// Every attempt for a single fetch failed
    #[error("giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Total number of attempts made (initial + retries)
        attempts: u32,
        /// The error from the final attempt
        #[source]
        source: Box<Error>,
    },

    /// Persistence backend error
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Server-supplied minimum wait carried by this error, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::HttpStatus { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}
