//! Client error types
//!
//! Every failure talking to the remote store is a [`DataAccessError`]. The
//! variants exist for logging and display; callers are not expected to
//! branch on them.

use thiserror::Error;

/// Data access error type
#[derive(Debug, Error)]
pub enum DataAccessError {
    /// HTTP request failed (connect, timeout, body decode)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Store rejected the request
    #[error("Store error ({status}): {message}")]
    Store {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Input rejected before it reached the store
    #[error("Validation error: {0}")]
    Validation(String),

    /// Change-notification channel failure
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),
}

impl DataAccessError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn realtime(message: impl Into<String>) -> Self {
        Self::Realtime(message.into())
    }
}

/// Result type for data access operations
pub type DataResult<T> = Result<T, DataAccessError>;
