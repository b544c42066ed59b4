//! Error types for quota-bucket.

use thiserror::Error;

/// Main error type for quota operations.
#[derive(Error, Debug)]
pub enum QuotaError {
    /// Rejected input: empty identity, zero cost or an invalid limiter setting.
    /// Raised before the store is touched.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The store could not run the check-and-consume operation.
    ///
    /// This is an infrastructure failure, never an admission decision.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redis::RedisError> for QuotaError {
    fn from(err: redis::RedisError) -> Self {
        QuotaError::StoreUnavailable(err.to_string())
    }
}

impl From<config::ConfigError> for QuotaError {
    fn from(err: config::ConfigError) -> Self {
        QuotaError::Config(err.to_string())
    }
}

impl QuotaError {
    /// Whether this error reports an unreachable or failing store.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, QuotaError::StoreUnavailable(_))
    }
}

/// Result type alias for quota operations.
pub type Result<T> = std::result::Result<T, QuotaError>;
