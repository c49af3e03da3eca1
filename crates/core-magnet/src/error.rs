//! Error types for magnet operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for magnet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, saving or validating magnets
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Magnet validation failed
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Digest is not 32 bytes of hex
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// Magnet file not found
    #[error("Magnet not found: {path}")]
    MagnetNotFound { path: PathBuf },
}

impl Error {
    /// Create a validation error with a message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Create a magnet not found error
    pub fn magnet_not_found<P: Into<PathBuf>>(path: P) -> Self {
        Error::MagnetNotFound { path: path.into() }
    }
}
