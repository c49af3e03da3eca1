/*!
 * Bulk update orchestration across a magnet's file set
 *
 * A session resolves the version chain starting at the installed version,
 * expands the newest reachable magnet into one `FileSync` per file, then
 * runs a diff pass and a patch pass over them in magnet order. Either pass
 * stops at the first failing file.
 */

use super::file_sync::{FileSync, SyncContext};
use super::layout::SyncRoot;
use super::progress::{ProgressEvent, SyncPass};
use crate::config::UpdateConfig;
use crate::error::{CometError, Result};
use comet_core_magnet::{validate_file_name, Magnet, MAGNET_EXT};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle of a bulk session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkPhase {
    Uninitialized,
    VersionResolved,
    Expanded,
    Diffing,
    Patching,
    Done,
    Failed,
}

impl fmt::Display for BulkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BulkPhase::Uninitialized => "uninitialized",
            BulkPhase::VersionResolved => "version-resolved",
            BulkPhase::Expanded => "expanded",
            BulkPhase::Diffing => "diffing",
            BulkPhase::Patching => "patching",
            BulkPhase::Done => "done",
            BulkPhase::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// One update session
#[derive(Debug)]
pub struct BulkSync {
    root: Arc<SyncRoot>,
    current_version: String,
    magnet: Option<Magnet>,
    latest_magnet: Option<Magnet>,
    entries: Vec<FileSync>,
    phase: BulkPhase,
}

impl BulkSync {
    pub fn new(
        directory: impl Into<std::path::PathBuf>,
        base_url: impl Into<String>,
        current_version: impl Into<String>,
    ) -> Result<Self> {
        let root = SyncRoot::new(directory, base_url);
        let current_version = current_version.into();

        if root.directory().as_os_str().is_empty() {
            return Err(CometError::InvalidArgument("directory is empty".to_string()));
        }
        if root.base_url().is_empty() {
            return Err(CometError::InvalidArgument("base URL is empty".to_string()));
        }
        if current_version.is_empty() {
            return Err(CometError::InvalidArgument(
                "current version is empty".to_string(),
            ));
        }

        Ok(Self {
            root: Arc::new(root),
            current_version,
            magnet: None,
            latest_magnet: None,
            entries: Vec::new(),
            phase: BulkPhase::Uninitialized,
        })
    }

    pub fn from_config(config: &UpdateConfig) -> Result<Self> {
        Self::new(
            config.directory.clone(),
            config.base_url.clone(),
            config.current_version.clone(),
        )
    }

    pub fn root(&self) -> &SyncRoot {
        &self.root
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    pub fn phase(&self) -> BulkPhase {
        self.phase
    }

    /// Magnet of the installed version
    pub fn magnet(&self) -> Option<&Magnet> {
        self.magnet.as_ref()
    }

    /// Newest magnet found beyond the installed version
    pub fn latest_magnet(&self) -> Option<&Magnet> {
        self.latest_magnet.as_ref()
    }

    /// Version the session updates to
    pub fn target_version(&self) -> Option<&str> {
        self.latest_magnet
            .as_ref()
            .or(self.magnet.as_ref())
            .map(|m| m.version.as_str())
    }

    pub fn entries(&self) -> &[FileSync] {
        &self.entries
    }

    pub fn complete_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_complete()).count()
    }

    /// Load the installed version's magnet, then follow `next_version`
    /// pointers until one cannot be loaded.
    ///
    /// Only the installed version's magnet is required; reaching the end of
    /// the chain is the normal way for the walk to stop.
    pub fn resolve_versions(&mut self, ctx: &SyncContext<'_>) -> Result<()> {
        self.magnet = None;
        self.latest_magnet = None;

        let magnet = match self.load_magnet(ctx, &self.current_version) {
            Ok(magnet) => magnet,
            Err(e) => {
                error!(
                    version = %self.current_version,
                    category = %e.category(),
                    error = %e,
                    "installed version magnet unavailable"
                );
                self.phase = BulkPhase::Failed;
                return Err(e);
            }
        };

        let mut visited = HashSet::new();
        visited.insert(self.current_version.clone());
        visited.insert(magnet.version.clone());

        let mut latest: Option<Magnet> = None;
        let mut next = magnet.next_version().map(str::to_string);

        while let Some(version) = next.take() {
            if !visited.insert(version.clone()) {
                warn!(version = %version, "version chain loops back, stopping");
                break;
            }
            match self.load_magnet(ctx, &version) {
                Ok(found) => {
                    debug!(version = %version, "found newer version");
                    next = found.next_version().map(str::to_string);
                    latest = Some(found);
                }
                Err(e) => {
                    debug!(version = %version, error = %e, "end of version chain");
                }
            }
        }

        info!(
            current = %self.current_version,
            latest = latest.as_ref().map(|m| m.version.as_str()).unwrap_or("none"),
            "versions resolved"
        );
        ctx.progress.publish(ProgressEvent::version_resolved(
            self.current_version.clone(),
            latest.as_ref().map(|m| m.version.clone()),
        ));

        self.magnet = Some(magnet);
        self.latest_magnet = latest;
        self.phase = BulkPhase::VersionResolved;
        Ok(())
    }

    /// Local copy of a version's magnet, downloaded when no valid one exists
    fn load_magnet(&self, ctx: &SyncContext<'_>, version: &str) -> Result<Magnet> {
        let file_name = format!("{}{}", version, MAGNET_EXT);
        validate_file_name(&file_name)
            .map_err(|e| CometError::InvalidArgument(format!("version {:?}: {}", version, e)))?;

        let path = self.root.magnet_path(version);
        if !Magnet::check_file(&path) {
            // An unreadable copy would otherwise be resumed
            if path.exists() {
                fs::remove_file(&path).map_err(|e| CometError::fs(&path, e))?;
            }
            fs::create_dir_all(self.root.directory())
                .map_err(|e| CometError::fs(self.root.directory(), e))?;

            let url = self.root.magnet_url(version);
            ctx.transport
                .fetch(&url, &path, ctx.magnet_timeout, &file_name)?;
        }

        Ok(Magnet::load(&path)?)
    }

    /// Build the per-file state, once per session
    pub fn expand(&mut self) -> Result<()> {
        if !self.entries.is_empty() {
            debug!(entries = self.entries.len(), "already expanded");
            return Ok(());
        }

        let source = self
            .latest_magnet
            .as_ref()
            .or(self.magnet.as_ref())
            .ok_or_else(|| {
                CometError::InvalidArgument("no magnet resolved; call resolve_versions first".to_string())
            })?;

        self.entries = source
            .files
            .iter()
            .map(|entry| FileSync::from_entry(Arc::clone(&self.root), entry))
            .collect::<Result<Vec<_>>>()?;

        info!(
            version = %source.version,
            files = self.entries.len(),
            bytes = source.total_size(),
            "expanded magnet"
        );
        self.phase = BulkPhase::Expanded;
        Ok(())
    }

    /// Diff every incomplete file, stopping at the first failure
    pub fn diff(&mut self, ctx: &SyncContext<'_>) -> Result<()> {
        self.expand()?;
        self.run_pass(ctx, SyncPass::Diff)
    }

    /// Patch every incomplete file, stopping at the first failure
    pub fn patch(&mut self, ctx: &SyncContext<'_>) -> Result<()> {
        if self.entries.is_empty() {
            if self.magnet.is_none() {
                warn!("patch called before versions were resolved, nothing to do");
                return Ok(());
            }
            self.expand()?;
        }
        self.run_pass(ctx, SyncPass::Patch)?;
        self.phase = BulkPhase::Done;
        Ok(())
    }

    fn run_pass(&mut self, ctx: &SyncContext<'_>, pass: SyncPass) -> Result<()> {
        self.phase = match pass {
            SyncPass::Diff => BulkPhase::Diffing,
            SyncPass::Patch => BulkPhase::Patching,
        };

        let pending = self.entries.len() - self.complete_count();
        info!(pass = %pass, pending, "starting pass");
        ctx.progress
            .publish(ProgressEvent::pass_started(pass, pending));

        for entry in self.entries.iter_mut().filter(|e| !e.is_complete()) {
            let result = match pass {
                SyncPass::Diff => entry.diff(ctx),
                SyncPass::Patch => entry.patch(ctx),
            };
            if let Err(e) = result {
                error!(
                    pass = %pass,
                    file = %entry.file_name(),
                    category = %e.category(),
                    error = %e,
                    "pass aborted"
                );
                self.phase = BulkPhase::Failed;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Resolve, diff and patch in one go
    pub fn run(&mut self, ctx: &SyncContext<'_>) -> Result<()> {
        let result = self.run_passes(ctx);

        let complete = self.complete_count();
        ctx.progress.publish(ProgressEvent::session_finished(
            result.is_ok(),
            complete,
            self.entries.len(),
        ));
        match &result {
            Ok(()) => info!(
                version = self.target_version().unwrap_or(""),
                files = complete,
                "update complete"
            ),
            Err(e) => error!(complete, total = self.entries.len(), error = %e, "update failed"),
        }
        result
    }

    fn run_passes(&mut self, ctx: &SyncContext<'_>) -> Result<()> {
        self.resolve_versions(ctx)?;
        self.diff(ctx)?;
        self.patch(ctx)
    }
}
