/*!
 * Progress event publisher for update monitoring
 *
 * Every Diff and Patch call on a tracked file ends with a `FileProgress`
 * event, whatever the outcome. Session-level events frame the bulk run.
 * Consumers (CLI renderer, telemetry) subscribe through a channel.
 */

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Bulk pass currently running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPass {
    Diff,
    Patch,
}

impl fmt::Display for SyncPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPass::Diff => write!(f, "diff"),
            SyncPass::Patch => write!(f, "patch"),
        }
    }
}

/// Progress event types
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// State of one tracked file after a Diff or Patch call
    FileProgress {
        file_name: String,
        cache_size: u64,
        file_size: u64,
        is_complete: bool,
        /// Number of Diff/Patch calls made on this file so far
        generation: u32,
        timestamp: u64,
    },

    /// Version chain resolved
    VersionResolved {
        current_version: String,
        latest_version: Option<String>,
        timestamp: u64,
    },

    /// A bulk pass is starting
    PassStarted {
        pass: SyncPass,
        pending_files: usize,
        timestamp: u64,
    },

    /// Bulk run finished
    SessionFinished {
        succeeded: bool,
        complete_files: usize,
        total_files: usize,
        timestamp: u64,
    },
}

impl ProgressEvent {
    fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Create a file progress event
    pub fn file_progress(
        file_name: impl Into<String>,
        cache_size: u64,
        file_size: u64,
        is_complete: bool,
        generation: u32,
    ) -> Self {
        ProgressEvent::FileProgress {
            file_name: file_name.into(),
            cache_size,
            file_size,
            is_complete,
            generation,
            timestamp: Self::current_timestamp(),
        }
    }

    /// Create a version resolution event
    pub fn version_resolved(current_version: String, latest_version: Option<String>) -> Self {
        ProgressEvent::VersionResolved {
            current_version,
            latest_version,
            timestamp: Self::current_timestamp(),
        }
    }

    /// Create a pass start event
    pub fn pass_started(pass: SyncPass, pending_files: usize) -> Self {
        ProgressEvent::PassStarted {
            pass,
            pending_files,
            timestamp: Self::current_timestamp(),
        }
    }

    /// Create a session finished event
    pub fn session_finished(succeeded: bool, complete_files: usize, total_files: usize) -> Self {
        ProgressEvent::SessionFinished {
            succeeded,
            complete_files,
            total_files,
            timestamp: Self::current_timestamp(),
        }
    }
}

/// Progress publisher - sends events to subscribers
#[derive(Clone)]
pub struct ProgressPublisher {
    sender: Option<Sender<ProgressEvent>>,
}

impl ProgressPublisher {
    /// Create a new publisher with bounded channel
    pub fn new(buffer_size: usize) -> (Self, ProgressSubscriber) {
        let (tx, rx) = bounded(buffer_size);
        (
            ProgressPublisher { sender: Some(tx) },
            ProgressSubscriber { receiver: rx },
        )
    }

    /// Create a new publisher with unbounded channel
    pub fn unbounded() -> (Self, ProgressSubscriber) {
        let (tx, rx) = unbounded();
        (
            ProgressPublisher { sender: Some(tx) },
            ProgressSubscriber { receiver: rx },
        )
    }

    /// Create a no-op publisher (for when progress tracking is disabled)
    pub fn noop() -> Self {
        ProgressPublisher { sender: None }
    }

    /// Publish an event
    pub fn publish(&self, event: ProgressEvent) {
        if let Some(ref tx) = self.sender {
            let _ = tx.send(event); // Ignore send errors (subscriber may have dropped)
        }
    }

    /// Publish the state of one tracked file
    pub fn file_progress(
        &self,
        file_name: &str,
        cache_size: u64,
        file_size: u64,
        is_complete: bool,
        generation: u32,
    ) {
        self.publish(ProgressEvent::file_progress(
            file_name,
            cache_size,
            file_size,
            is_complete,
            generation,
        ));
    }
}

impl Default for ProgressPublisher {
    fn default() -> Self {
        Self::noop()
    }
}

/// Progress subscriber - receives events
pub struct ProgressSubscriber {
    receiver: Receiver<ProgressEvent>,
}

impl ProgressSubscriber {
    /// Get the receiver for consuming events
    pub fn receiver(&self) -> &Receiver<ProgressEvent> {
        &self.receiver
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv(&self) -> Option<ProgressEvent> {
        self.receiver.try_recv().ok()
    }

    /// Receive an event (blocking)
    pub fn recv(&self) -> Option<ProgressEvent> {
        self.receiver.recv().ok()
    }

    /// Drain everything published so far
    pub fn drain(&self) -> Vec<ProgressEvent> {
        self.receiver.try_iter().collect()
    }
}

/// Shared progress publisher that can be cloned across threads
pub type SharedProgressPublisher = Arc<ProgressPublisher>;
