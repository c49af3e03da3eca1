/*!
 * Comet - content-addressed, resumable file updates
 *
 * Brings an installed file set up to the newest published version:
 * - Version chain discovery through linked magnets
 * - Block-level delta transfer against stale local copies
 * - Resumable downloads staged under content-addressed temp names
 * - Atomic promotion so a crash never leaves a half-written file
 * - HTTP(S) and local mirror transports
 *
 * Version: 0.6.0
 * Author: Shane Wall <shaneawall@gmail.com>
 */

pub mod cli_progress;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod transport;

// Re-export commonly used types
pub use comet_core_magnet::{Digest, FileEntry, Magnet};
pub use config::{LogLevel, UpdateConfig};
pub use core::{BulkSync, FileSync, ProgressPublisher, SyncContext, SyncRoot};
pub use error::{CometError, Result};
pub use transport::Transport;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
