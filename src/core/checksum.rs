/*!
 * Streaming strong digest calculation
 */

use crate::error::{CometError, Result};
use comet_core_magnet::{Digest, DIGEST_SIZE};
use sha2::{Digest as _, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Streaming hasher that calculates the strong digest incrementally
pub struct StreamingHasher {
    hasher: Sha256,
}

impl StreamingHasher {
    /// Create a new streaming hasher
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    /// Update the hash with new data
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Finalize and return the digest
    pub fn finalize(self) -> Digest {
        let output = self.hasher.finalize();
        let mut bytes = [0u8; DIGEST_SIZE];
        bytes.copy_from_slice(&output);
        Digest::new(bytes)
    }
}

impl Default for StreamingHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Strong digest of an in-memory buffer
pub fn digest_bytes(data: &[u8]) -> Digest {
    let mut hasher = StreamingHasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Strong digest of a file
pub fn file_digest(path: &Path) -> Result<Digest> {
    let file = File::open(path).map_err(|e| CometError::fs(path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = StreamingHasher::new();
    let mut buffer = [0u8; 64 * 1024]; // 64KB buffer

    loop {
        let n = reader.read(&mut buffer).map_err(|e| CometError::fs(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}
