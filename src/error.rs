//! Error types for bucketgate.
//!
//! Admission denial is not an error: limiters report it as `false`.

use thiserror::Error;

/// Main error type for bucketgate operations.
#[derive(Error, Debug)]
pub enum BucketgateError {
    /// Invalid limiter or file configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// No async runtime available to host the refill task
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for bucketgate operations.
pub type Result<T> = std::result::Result<T, BucketgateError>;
