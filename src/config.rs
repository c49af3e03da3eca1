/*!
 * Configuration types for Comet
 */

use crate::error::{CometError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for an update session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Install directory holding the working files
    #[serde(default)]
    pub directory: PathBuf,

    /// Mirror base URL (http://, https://, file:// or a plain path)
    #[serde(default)]
    pub base_url: String,

    /// Version currently installed; the chain walk starts here
    #[serde(default)]
    pub current_version: String,

    /// Timeout for file downloads in seconds
    #[serde(default = "default_file_timeout")]
    pub file_timeout_secs: u64,

    /// Timeout for magnet downloads in seconds
    #[serde(default = "default_magnet_timeout")]
    pub magnet_timeout_secs: u64,

    /// Block size used when publishing signatures
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Show progress output
    #[serde(default = "default_true")]
    pub show_progress: bool,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            base_url: String::new(),
            current_version: String::new(),
            file_timeout_secs: default_file_timeout(),
            magnet_timeout_secs: default_magnet_timeout(),
            block_size: default_block_size(),
            show_progress: true,
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Info, warnings, and errors
    #[default]
    Info,
    /// Debug and above
    Debug,
    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_file_timeout() -> u64 {
    20
}

fn default_magnet_timeout() -> u64 {
    2
}

fn default_block_size() -> usize {
    64 * 1024 // 64 KB
}

impl UpdateConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| CometError::fs(path, e))?;
        toml::from_str(&contents)
            .map_err(|e| CometError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| CometError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents).map_err(|e| CometError::fs(path, e))
    }

    /// Check the session parameters an update needs
    pub fn validate(&self) -> Result<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(CometError::Config("directory is not set".to_string()));
        }
        if self.base_url.is_empty() {
            return Err(CometError::Config("base_url is not set".to_string()));
        }
        if self.current_version.is_empty() {
            return Err(CometError::Config("current_version is not set".to_string()));
        }
        if self.block_size == 0 {
            return Err(CometError::Config("block_size must be positive".to_string()));
        }
        if self.block_size > crate::core::delta::signature::MAX_BLOCK_SIZE {
            return Err(CometError::Config(format!(
                "block_size must not exceed {} bytes",
                crate::core::delta::signature::MAX_BLOCK_SIZE
            )));
        }
        Ok(())
    }

    pub fn file_timeout(&self) -> Duration {
        Duration::from_secs(self.file_timeout_secs)
    }

    pub fn magnet_timeout(&self) -> Duration {
        Duration::from_secs(self.magnet_timeout_secs)
    }
}
