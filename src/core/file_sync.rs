/*!
 * Per-file synchronization state machine
 *
 * Brings one tracked file to a complete, digest-verified state. Every
 * change to the working file is staged under a content-addressed temp
 * name and promoted with an atomic rename, so after a crash the working
 * path holds either the old or the new content, never a partial write.
 * Both operations are safe to re-run at any point.
 */

use super::delta::{DeltaEngine, DeltaPlan};
use super::layout::SyncRoot;
use super::progress::ProgressPublisher;
use crate::error::{CometError, Result};
use crate::transport::Transport;
use comet_core_magnet::{validate_file_name, Digest, FileEntry};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Collaborators used by every Diff/Patch call
pub struct SyncContext<'a> {
    pub engine: &'a dyn DeltaEngine,
    pub transport: &'a dyn Transport,
    pub progress: &'a ProgressPublisher,
    pub file_timeout: Duration,
    pub magnet_timeout: Duration,
}

impl<'a> SyncContext<'a> {
    pub fn new(
        engine: &'a dyn DeltaEngine,
        transport: &'a dyn Transport,
        progress: &'a ProgressPublisher,
    ) -> Self {
        Self {
            engine,
            transport,
            progress,
            file_timeout: Duration::from_secs(20),
            magnet_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_timeouts(mut self, file_timeout: Duration, magnet_timeout: Duration) -> Self {
        self.file_timeout = file_timeout;
        self.magnet_timeout = magnet_timeout;
        self
    }
}

/// Length of a file, or `None` when it does not exist
pub(crate) fn file_len(path: &Path) -> Result<Option<u64>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CometError::fs(path, e)),
    }
}

/// State of one tracked file
#[derive(Debug)]
pub struct FileSync {
    root: Arc<SyncRoot>,
    file_name: String,
    file_size: u64,
    file_digest: Digest,
    cache_size: u64,
    is_complete: bool,
    plan: Option<DeltaPlan>,
    generation: u32,
}

impl FileSync {
    pub fn new(
        root: Arc<SyncRoot>,
        file_name: impl Into<String>,
        file_size: u64,
        file_digest: Digest,
    ) -> Result<Self> {
        let file_name = file_name.into();
        validate_file_name(&file_name).map_err(|e| CometError::InvalidArgument(e.to_string()))?;

        Ok(Self {
            root,
            file_name,
            file_size,
            file_digest,
            cache_size: 0,
            is_complete: false,
            plan: None,
            generation: 0,
        })
    }

    /// Track a magnet entry
    pub fn from_entry(root: Arc<SyncRoot>, entry: &FileEntry) -> Result<Self> {
        Self::new(root, entry.name.clone(), entry.size, entry.digest)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn file_digest(&self) -> &Digest {
        &self.file_digest
    }

    pub fn cache_size(&self) -> u64 {
        self.cache_size
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    /// Plan from the last successful diff, until patch consumes it
    pub fn plan(&self) -> Option<&DeltaPlan> {
        self.plan.as_ref()
    }

    /// Diff/Patch calls made so far
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn working_path(&self) -> PathBuf {
        self.root.working_path(&self.file_name)
    }

    pub fn temp_path(&self) -> PathBuf {
        self.root.temp_path(&self.file_digest)
    }

    /// Work out how much of the target is already available locally.
    ///
    /// Resets progress, then either records a partial download, confirms
    /// the working file is already the target, or computes a delta plan.
    pub fn diff(&mut self, ctx: &SyncContext<'_>) -> Result<()> {
        self.generation += 1;
        let result = self.diff_inner(ctx);
        if let Err(ref e) = result {
            warn!(file = %self.file_name, error = %e, "diff failed");
        }
        self.report(ctx);
        result
    }

    fn diff_inner(&mut self, ctx: &SyncContext<'_>) -> Result<()> {
        self.cache_size = 0;
        self.is_complete = false;
        self.plan = None;

        let working = self.working_path();
        let temp = self.temp_path();

        if file_len(&working)?.is_none() {
            match file_len(&temp)? {
                None => {
                    debug!(file = %self.file_name, "no local data, full download needed");
                    return Ok(());
                }
                Some(len) if len < self.file_size => {
                    debug!(file = %self.file_name, have = len, "partial download present");
                    self.cache_size = len;
                    return Ok(());
                }
                Some(len) => {
                    if len > self.file_size {
                        warn!(
                            file = %self.file_name,
                            have = len,
                            want = self.file_size,
                            "staged file larger than target, promoting for verification"
                        );
                    }
                    self.promote(&temp, &working)?
                }
            }
        }

        if self.verify_working(ctx, &working)? {
            return Ok(());
        }

        let plan = self.compute_plan(ctx, &working, &temp)?;
        self.plan = Some(plan);
        Ok(())
    }

    /// Bring the working file to the target content.
    ///
    /// Downloads when nothing usable is on disk, otherwise applies the
    /// delta plan (recomputing it if absent). The plan never survives
    /// this call.
    ///
    /// On an entry that is already complete nothing on disk is touched,
    /// but the call still counts towards `generation` and publishes a
    /// progress event, so every call is observable to progress consumers.
    pub fn patch(&mut self, ctx: &SyncContext<'_>) -> Result<()> {
        self.generation += 1;

        if self.is_complete && self.cache_size == self.file_size {
            warn!(file = %self.file_name, "patch called on a complete file, nothing to do");
            self.report(ctx);
            return Ok(());
        }

        let result = self.patch_inner(ctx);
        self.plan = None;
        if let Err(ref e) = result {
            warn!(file = %self.file_name, error = %e, "patch failed");
        }
        self.report(ctx);
        result
    }

    fn patch_inner(&mut self, ctx: &SyncContext<'_>) -> Result<()> {
        let working = self.working_path();
        let temp = self.temp_path();

        if file_len(&working)?.is_none() {
            let staged = file_len(&temp)?;
            if staged.map_or(true, |len| len < self.file_size) {
                let url = self.root.file_url(&self.file_digest);
                info!(
                    file = %self.file_name,
                    resume_from = staged.unwrap_or(0),
                    "downloading"
                );
                ensure_parent(&temp)?;
                ctx.transport
                    .fetch(&url, &temp, ctx.file_timeout, &self.file_name)?;
                // Anything planned against the old local state is stale now
                self.plan = None;
            }
            self.promote(&temp, &working)?;
        }

        if self.verify_working(ctx, &working)? {
            return Ok(());
        }

        let plan = match self.plan.take() {
            Some(plan) => plan,
            None => self.compute_plan(ctx, &working, &temp)?,
        };

        let url = self.root.file_url(&self.file_digest);
        ctx.engine.patch(&working, &temp, &url, &plan)?;

        if let Err(e) = fs::remove_file(&working) {
            warn!(
                file = %self.file_name,
                error = %e,
                "could not remove superseded working file"
            );
        }
        self.promote(&temp, &working)?;
        self.mark_complete();
        info!(file = %self.file_name, size = self.file_size, "patched");
        Ok(())
    }

    /// Check the working file against the target; marks complete on a match.
    fn verify_working(&mut self, ctx: &SyncContext<'_>, working: &Path) -> Result<bool> {
        let len = file_len(working)?.ok_or_else(|| {
            CometError::InvariantViolation(format!(
                "{} missing after promotion",
                working.display()
            ))
        })?;

        if len == self.file_size && ctx.engine.file_digest(working)? == self.file_digest {
            debug!(file = %self.file_name, "working file is up to date");
            self.mark_complete();
            return Ok(true);
        }
        Ok(false)
    }

    fn compute_plan(
        &mut self,
        ctx: &SyncContext<'_>,
        working: &Path,
        temp: &Path,
    ) -> Result<DeltaPlan> {
        let url = self.root.signature_url(&self.file_digest);
        let plan = ctx.engine.diff(working, temp, &url)?;

        if plan.info.digest != self.file_digest {
            return Err(CometError::engine(format!(
                "signature at {} describes {}, expected {}",
                url, plan.info.digest, self.file_digest
            )));
        }

        self.cache_size = plan.reusable_bytes();
        debug!(
            file = %self.file_name,
            matched = plan.result.match_num,
            cached = plan.result.cache_num,
            reusable = self.cache_size,
            "delta planned"
        );
        Ok(plan)
    }

    /// Atomically move the staged temp file onto the working path
    fn promote(&self, temp: &Path, working: &Path) -> Result<()> {
        ensure_parent(working)?;
        fs::rename(temp, working).map_err(|e| CometError::fs(temp, e))
    }

    fn mark_complete(&mut self) {
        self.cache_size = self.file_size;
        self.is_complete = true;
    }

    fn report(&self, ctx: &SyncContext<'_>) {
        ctx.progress.file_progress(
            &self.file_name,
            self.cache_size,
            self.file_size,
            self.is_complete,
            self.generation,
        );
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| CometError::fs(parent, e))
        }
        _ => Ok(()),
    }
}
