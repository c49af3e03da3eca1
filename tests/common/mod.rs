/*!
 * Recording collaborators shared by the integration tests
 */

#![allow(dead_code)]

use comet::core::checksum::{digest_bytes, file_digest};
use comet::core::delta::{BlockSource, DeltaEngine, DeltaPlan, DiffResult, Signature};
use comet::core::progress::{ProgressEvent, ProgressPublisher, ProgressSubscriber};
use comet::core::{SyncContext, SyncRoot};
use comet::error::{CometError, Result};
use comet::transport::Transport;
use comet::{Digest, Magnet};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::ops::Range;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{tempdir, TempDir};

pub const BASE_URL: &str = "mock://mirror";
pub const BLOCK_SIZE: usize = 4;

/// Delta engine that serves known targets and records every call
pub struct MockEngine {
    targets: HashMap<Digest, Vec<u8>>,
    fail_diff: HashSet<String>,
    fail_patch: bool,
    fail_patch_names: HashSet<String>,
    consume_working: bool,
    calls: RefCell<Vec<String>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            targets: HashMap::new(),
            fail_diff: HashSet::new(),
            fail_patch: false,
            fail_patch_names: HashSet::new(),
            consume_working: false,
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Make a target's content available; returns its digest
    pub fn add_target(&mut self, content: &[u8]) -> Digest {
        let digest = digest_bytes(content);
        self.targets.insert(digest, content.to_vec());
        digest
    }

    /// Fail diff for the working file with this name
    pub fn fail_diff_for(&mut self, file_name: &str) {
        self.fail_diff.insert(file_name.to_string());
    }

    pub fn fail_patch(&mut self) {
        self.fail_patch = true;
    }

    /// Fail patch for the working file with this name only
    pub fn fail_patch_for(&mut self, file_name: &str) {
        self.fail_patch_names.insert(file_name.to_string());
    }

    /// Delete the working file while patching, as an in-place engine would
    pub fn consume_working(&mut self) {
        self.consume_working = true;
    }

    /// `diff:<name>` / `patch:<name>` in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn diff_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("diff:")).count()
    }

    pub fn patch_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("patch:")).count()
    }

    fn record(&self, op: &str, working: &Path) -> String {
        let name = working
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.calls.borrow_mut().push(format!("{}:{}", op, name));
        name
    }

    fn target(&self, digest: &Digest) -> Result<&Vec<u8>> {
        self.targets
            .get(digest)
            .ok_or_else(|| CometError::engine(format!("unknown target {}", digest)))
    }
}

impl DeltaEngine for MockEngine {
    fn file_digest(&self, path: &Path) -> Result<Digest> {
        file_digest(path)
    }

    fn diff(&self, working: &Path, _temp: &Path, signature_url: &str) -> Result<DeltaPlan> {
        let name = self.record("diff", working);
        if self.fail_diff.contains(&name) {
            return Err(CometError::engine(format!("diff failed for {}", name)));
        }

        let hex = signature_url
            .rsplit('/')
            .next()
            .and_then(|last| last.strip_suffix(".sig"))
            .ok_or_else(|| CometError::engine("bad signature url"))?;
        let digest = Digest::from_hex(hex).map_err(CometError::engine)?;
        let target = self.target(&digest)?;
        let info = Signature::from_reader(&target[..], BLOCK_SIZE)?;

        let local = fs::read(working).unwrap_or_default();
        let sources = (0..info.block_count())
            .map(|i| {
                let start = info.block_offset(i) as usize;
                let block = &target[start..start + info.block_len(i)];
                if local.get(start..start + block.len()) == Some(block) {
                    BlockSource::Matched {
                        offset: start as u64,
                    }
                } else {
                    BlockSource::Missing
                }
            })
            .collect();

        Ok(DeltaPlan::new(info, DiffResult::from_sources(sources)))
    }

    fn patch(&self, working: &Path, temp: &Path, _file_url: &str, plan: &DeltaPlan) -> Result<()> {
        let name = self.record("patch", working);
        if self.fail_patch || self.fail_patch_names.contains(&name) {
            return Err(CometError::engine(format!("patch failed for {}", name)));
        }
        let target = self.target(&plan.info.digest)?;
        fs::write(temp, target).map_err(|e| CometError::fs(temp, e))?;
        if self.consume_working {
            fs::remove_file(working).map_err(|e| CometError::fs(working, e))?;
        }
        Ok(())
    }
}

/// In-memory mirror that records every URL requested
pub struct MockTransport {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fetched: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, name: &str, content: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(format!("{}/{}", BASE_URL, name), content.to_vec());
    }

    pub fn remove(&self, name: &str) {
        self.objects
            .lock()
            .unwrap()
            .remove(&format!("{}/{}", BASE_URL, name));
    }

    pub fn insert_magnet(&self, magnet: &Magnet) {
        let json = serde_json::to_vec(magnet).unwrap();
        self.insert(&format!("{}.magnet", magnet.version), &json);
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.objects
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| CometError::transfer(url, "404 Not Found"))
    }
}

impl Transport for MockTransport {
    fn fetch(&self, url: &str, dest: &Path, _timeout: Duration, _label: &str) -> Result<()> {
        let data = self.get(url)?;
        let existing = fs::metadata(dest).map(|m| m.len() as usize).unwrap_or(0);

        if existing > 0 && existing <= data.len() {
            let mut file = OpenOptions::new()
                .append(true)
                .open(dest)
                .map_err(|e| CometError::fs(dest, e))?;
            file.write_all(&data[existing..])
                .map_err(|e| CometError::fs(dest, e))
        } else {
            fs::write(dest, &data).map_err(|e| CometError::fs(dest, e))
        }
    }

    fn fetch_bytes(
        &self,
        url: &str,
        range: Option<Range<u64>>,
        _timeout: Duration,
    ) -> Result<Vec<u8>> {
        let data = self.get(url)?;
        match range {
            Some(r) => Ok(data[r.start as usize..r.end as usize].to_vec()),
            None => Ok(data),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Temp install directory plus mocks
pub struct Harness {
    pub dir: TempDir,
    pub engine: MockEngine,
    pub transport: MockTransport,
    pub progress: ProgressPublisher,
    pub subscriber: ProgressSubscriber,
}

impl Harness {
    pub fn new() -> Self {
        let (progress, subscriber) = ProgressPublisher::unbounded();
        Self {
            dir: tempdir().unwrap(),
            engine: MockEngine::new(),
            transport: MockTransport::new(),
            progress,
            subscriber,
        }
    }

    pub fn root(&self) -> Arc<SyncRoot> {
        Arc::new(SyncRoot::new(self.dir.path(), BASE_URL))
    }

    pub fn ctx(&self) -> SyncContext<'_> {
        SyncContext::new(&self.engine, &self.transport, &self.progress)
    }

    pub fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, content: &[u8]) {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    /// File progress events published so far as (name, cache, complete, generation)
    pub fn file_events(&self) -> Vec<(String, u64, bool, u32)> {
        self.subscriber
            .drain()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::FileProgress {
                    file_name,
                    cache_size,
                    is_complete,
                    generation,
                    ..
                } => Some((file_name, cache_size, is_complete, generation)),
                _ => None,
            })
            .collect()
    }
}
