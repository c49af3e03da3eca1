/*!
 * Delta engine: block-level reconstruction of a target file
 *
 * `diff` works out which target blocks can be sourced locally (already
 * staged in the temp file, or found anywhere in the stale working file)
 * and `patch` assembles the target in the temp file, fetching only the
 * missing runs from the mirror.
 */

pub mod checksum;
pub mod engine;
pub mod signature;

pub use engine::RollingEngine;
pub use signature::{BlockSum, Signature};

use crate::error::Result;
use comet_core_magnet::Digest;
use std::path::Path;

/// Block layout of the target, as published in its signature
pub type BlockInfo = Signature;

/// Where a target block comes from during patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSource {
    /// Already in place in the temp file
    Cached,
    /// Present in the working file at `offset`
    Matched { offset: u64 },
    /// Must be fetched from the mirror
    Missing,
}

/// Outcome of block matching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffResult {
    pub match_num: usize,
    pub cache_num: usize,
    pub sources: Vec<BlockSource>,
}

impl DiffResult {
    pub fn from_sources(sources: Vec<BlockSource>) -> Self {
        let match_num = sources
            .iter()
            .filter(|s| matches!(s, BlockSource::Matched { .. }))
            .count();
        let cache_num = sources
            .iter()
            .filter(|s| matches!(s, BlockSource::Cached))
            .count();
        Self {
            match_num,
            cache_num,
            sources,
        }
    }

    pub fn missing_num(&self) -> usize {
        self.sources.len() - self.match_num - self.cache_num
    }
}

/// Everything patch needs, produced by one successful diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaPlan {
    pub info: BlockInfo,
    pub result: DiffResult,
}

impl DeltaPlan {
    pub fn new(info: BlockInfo, result: DiffResult) -> Self {
        Self { info, result }
    }

    pub fn block_size(&self) -> usize {
        self.info.block_size
    }

    /// Bytes of the target obtainable without network transfer.
    ///
    /// Counted in whole blocks, then capped at the target size since the
    /// last block may be short.
    pub fn reusable_bytes(&self) -> u64 {
        let blocks = (self.result.match_num + self.result.cache_num) as u64;
        (blocks * self.info.block_size as u64).min(self.info.file_size)
    }
}

/// Strong digests plus block-level diff/patch
pub trait DeltaEngine {
    /// Strong digest of a local file
    fn file_digest(&self, path: &Path) -> Result<Digest>;

    /// Plan reconstruction of the target described at `signature_url`
    fn diff(&self, working: &Path, temp: &Path, signature_url: &str) -> Result<DeltaPlan>;

    /// Reconstruct the target at `temp`; on success its digest equals
    /// `plan.info.digest`
    fn patch(&self, working: &Path, temp: &Path, file_url: &str, plan: &DeltaPlan) -> Result<()>;
}
