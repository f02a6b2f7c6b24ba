//! Backend error taxonomy
//!
//! Distinguishes transient failures (retried by [`RecoveryPolicy`]) from
//! failures that must be reported immediately.
//!
//! [`RecoveryPolicy`]: super::recovery::RecoveryPolicy

use thiserror::Error;

/// Errors raised by backend operations
#[derive(Debug, Error)]
pub enum BackendError {
    /// No candidate backend is installed or running
    #[error("No LLM backend available: {message}")]
    Unavailable { message: String },

    /// The backend is installed but its server is not running
    #[error("Backend '{backend}' is not running")]
    NotRunning { backend: String },

    /// Request timed out after the specified duration (in seconds)
    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The backend endpoint refused or dropped the connection
    #[error("Connection failed: {message}")]
    Connection { message: String },

    /// The backend answered with a non-success HTTP status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The requested model is not present in the backend
    #[error("Model '{model}' not found")]
    ModelNotFound { model: String },

    /// The backend answered with a body that could not be interpreted
    #[error("Invalid response from backend: {message}")]
    InvalidResponse { message: String },

    /// The variant cannot stream completions
    #[error("Backend '{backend}' does not support streaming")]
    StreamingUnsupported { backend: String },

    /// A managed subprocess failed to launch or exited unexpectedly
    #[error("Process error: {message}")]
    Process { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Whether the failure is worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Timeout { .. } | BackendError::Connection { .. } => true,
            BackendError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Classifies a `reqwest` failure
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            BackendError::Timeout {
                seconds: timeout_secs,
            }
        } else if err.is_connect() {
            BackendError::Connection {
                message: err.to_string(),
            }
        } else if err.is_decode() {
            BackendError::InvalidResponse {
                message: err.to_string(),
            }
        } else {
            BackendError::Connection {
                message: format!("Request failed: {}", err),
            }
        }
    }
}
