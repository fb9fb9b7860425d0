//! Error types for the host-remap crate.
//!
//! Rewriting never fails: an unmapped or unusable lookup simply leaves the
//! hostname alone. The errors below come from the edges of the crate, i.e.
//! configuration loading, request validation and the wrapped transport.

use thiserror::Error;

/// Main error type for host-remap.
#[derive(Error, Debug)]
pub enum RemapError {
    /// Configuration file could not be found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}")]
    ConfigValidation { message: String },

    /// The outbound request cannot be dispatched (no host, bad scheme, ...).
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// The wrapped transport failed to connect. Reported exactly as the
    /// transport produced it.
    #[error(transparent)]
    Connect(std::io::Error),

    /// HTTP protocol error from hyper.
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// I/O error wrapper.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemapError {
    /// Creates a new configuration parse error.
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
        }
    }

    /// Creates a new configuration validation error.
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Creates a new invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}

/// Result type alias using RemapError.
pub type Result<T> = std::result::Result<T, RemapError>;
