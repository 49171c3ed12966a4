//! Error types for the Bee CLI

use thiserror::Error;

/// Main error type for configuration and argument handling
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    Validation(String),

    #[error("Configuration directory not found")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using the Bee core Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }
}
