/*!
 * Block signature of a published file
 *
 * Published next to every content-addressed file on the mirror. Lists one
 * weak/strong checksum pair per block plus the whole-file digest, which is
 * all a client needs to find reusable data locally and verify what it
 * fetches.
 */

use super::checksum::{block_hash, weak_checksum, BlockHash};
use crate::core::checksum::StreamingHasher;
use crate::error::{CometError, Result};
use comet_core_magnet::Digest;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Largest block size accepted when building or decoding a signature
pub const MAX_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Checksums of one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSum {
    pub weak: u32,
    pub strong: BlockHash,
}

impl BlockSum {
    pub fn of(data: &[u8]) -> Self {
        Self {
            weak: weak_checksum(data),
            strong: block_hash(data),
        }
    }

    /// Strong comparison against a candidate block
    pub fn matches(&self, data: &[u8]) -> bool {
        block_hash(data) == self.strong
    }
}

/// Block layout of a target file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub block_size: usize,
    pub file_size: u64,
    pub digest: Digest,
    pub blocks: Vec<BlockSum>,
}

impl Signature {
    /// Compute the signature of a file on disk
    pub fn generate(path: &Path, block_size: usize) -> Result<Self> {
        let file = File::open(path).map_err(|e| CometError::fs(path, e))?;
        Self::from_reader(BufReader::new(file), block_size).map_err(|e| match e {
            CometError::Io(io) => CometError::fs(path, io),
            other => other,
        })
    }

    /// Compute the signature of a byte stream
    pub fn from_reader<R: Read>(mut reader: R, block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(CometError::InvalidArgument(
                "block size must be positive".to_string(),
            ));
        }
        if block_size > MAX_BLOCK_SIZE {
            return Err(CometError::InvalidArgument(format!(
                "block size {} exceeds {} bytes",
                block_size, MAX_BLOCK_SIZE
            )));
        }

        let mut hasher = StreamingHasher::new();
        let mut blocks = Vec::new();
        let mut file_size = 0u64;
        let mut buffer = vec![0u8; block_size];

        loop {
            let n = read_block(&mut reader, &mut buffer)?;
            if n == 0 {
                break;
            }
            let block = &buffer[..n];
            hasher.update(block);
            blocks.push(BlockSum::of(block));
            file_size += n as u64;
            if n < block_size {
                break;
            }
        }

        Ok(Self {
            block_size,
            file_size,
            digest: hasher.finalize(),
            blocks,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| CometError::engine(format!("Failed to encode signature: {}", e)))
    }

    /// Decode and sanity-check a signature fetched from a mirror
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let signature: Signature = bincode::deserialize(bytes)
            .map_err(|e| CometError::engine(format!("Malformed signature: {}", e)))?;

        if signature.block_size == 0 {
            return Err(CometError::engine("Signature has zero block size"));
        }
        if signature.block_size > MAX_BLOCK_SIZE {
            return Err(CometError::engine(format!(
                "Signature block size {} exceeds {} bytes",
                signature.block_size, MAX_BLOCK_SIZE
            )));
        }
        let expected = signature.file_size.div_ceil(signature.block_size as u64);
        if signature.blocks.len() as u64 != expected {
            return Err(CometError::engine(format!(
                "Signature lists {} blocks, expected {}",
                signature.blocks.len(),
                expected
            )));
        }
        Ok(signature)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Byte offset of a block in the target
    pub fn block_offset(&self, index: usize) -> u64 {
        index as u64 * self.block_size as u64
    }

    /// Length of a block; only the last one may be short
    pub fn block_len(&self, index: usize) -> usize {
        let remaining = self.file_size.saturating_sub(self.block_offset(index));
        remaining.min(self.block_size as u64) as usize
    }
}

/// Fill `buffer` from `reader`, stopping early only at end of input
pub(crate) fn read_block<R: Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
