//! Error types for coxswain
//!
//! All registry-facing operations return [`CoxswainError`]. Transient errors
//! (network failures, bad registry responses) are absorbed by the watcher and
//! the pool refresh path; explicit user actions such as registration
//! propagate them to the caller.

use thiserror::Error;

/// Main error type for coxswain operations
#[derive(Debug, Error)]
pub enum CoxswainError {
    /// Network level failure talking to the registry
    #[error("Network error: {0}")]
    Network(String),

    /// The registry answered with an error status or a malformed response
    #[error("Registry backend error: {0}")]
    Backend(String),

    /// Service registration failed
    #[error("Service registration failed: {0}")]
    Registration(String),

    /// No such service is known to the registry
    #[error("Service not found: {service}")]
    ServiceNotFound { service: String },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for coxswain operations
pub type Result<T> = std::result::Result<T, CoxswainError>;

impl CoxswainError {
    /// Create a network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network(message.into())
    }

    /// Create a registry backend error
    pub fn backend<S: Into<String>>(message: S) -> Self {
        Self::Backend(message.into())
    }

    /// Create a registration error
    pub fn registration<S: Into<String>>(message: S) -> Self {
        Self::Registration(message.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Whether the error is transient and the operation can be retried.
    ///
    /// Malformed registry responses count as transient: the registry is
    /// expected to recover, and the previously known instance set stays
    /// authoritative in the meantime.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoxswainError::Network(_)
                | CoxswainError::Backend(_)
                | CoxswainError::Serialization(_)
                | CoxswainError::Io(_)
        )
    }
}

impl From<reqwest::Error> for CoxswainError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            CoxswainError::Network(format!("Registry request failed: {}", err))
        } else {
            CoxswainError::Backend(format!("Registry request failed: {}", err))
        }
    }
}
