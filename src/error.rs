/*!
 * Error types for Comet
 */

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CometError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;
pub const EXIT_INTEGRITY: i32 = 3;

#[derive(Debug, Error)]
pub enum CometError {
    /// Missing or malformed input to an operation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// stat/rename/remove failed for a reason other than "not found"
    #[error("File system error on {}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A file that a successful rename should have produced is missing
    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),

    /// Download failed
    #[error("Transfer failed for {url}: {message}")]
    Transfer { url: String, message: String },

    /// Diff or patch computation failed
    #[error("Delta engine error: {0}")]
    Engine(String),

    /// Magnet could not be parsed or validated
    #[error("Magnet error: {0}")]
    Magnet(#[from] comet_core_magnet::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unclassified I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CometError {
    /// Wrap an I/O error with the path it happened on
    pub fn fs(path: impl AsRef<Path>, source: io::Error) -> Self {
        CometError::FileSystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Build a transfer error for `url`
    pub fn transfer(url: impl Into<String>, message: impl fmt::Display) -> Self {
        CometError::Transfer {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Build an engine error
    pub fn engine(message: impl fmt::Display) -> Self {
        CometError::Engine(message.to_string())
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CometError::InvalidArgument(_)
            | CometError::Config(_)
            | CometError::InvariantViolation(_)
            | CometError::Magnet(_) => EXIT_FATAL,
            CometError::Engine(_) => EXIT_INTEGRITY,
            _ => EXIT_PARTIAL,
        }
    }

    /// Check if this error is fatal (re-running will not help)
    pub fn is_fatal(&self) -> bool {
        match self {
            CometError::InvalidArgument(_) => true,
            CometError::InvariantViolation(_) => true,
            CometError::Config(_) => true,
            CometError::Magnet(_) => true,

            CometError::FileSystem { .. } => false,
            CometError::Transfer { .. } => false,
            CometError::Engine(_) => false,
            CometError::Io(_) => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            CometError::InvalidArgument(_) => ErrorCategory::Validation,
            CometError::FileSystem { .. } => ErrorCategory::Filesystem,
            CometError::InvariantViolation(_) => ErrorCategory::Bug,
            CometError::Transfer { .. } => ErrorCategory::Network,
            CometError::Engine(_) => ErrorCategory::Integrity,
            CometError::Magnet(_) => ErrorCategory::Manifest,
            CometError::Config(_) => ErrorCategory::Configuration,
            CometError::Io(_) => ErrorCategory::IoError,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Argument validation errors
    Validation,
    /// Filesystem operations (stat, rename, remove)
    Filesystem,
    /// Unreachable states reached
    Bug,
    /// Download errors
    Network,
    /// Diff/patch and digest verification errors
    Integrity,
    /// Magnet parse/validation errors
    Manifest,
    /// Configuration errors
    Configuration,
    /// Other I/O errors
    IoError,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Filesystem => write!(f, "filesystem"),
            ErrorCategory::Bug => write!(f, "bug"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Integrity => write!(f, "integrity"),
            ErrorCategory::Manifest => write!(f, "manifest"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::IoError => write!(f, "io"),
        }
    }
}

impl From<serde_json::Error> for CometError {
    fn from(err: serde_json::Error) -> Self {
        CometError::Config(format!("JSON parse error: {}", err))
    }
}
