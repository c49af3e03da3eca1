/*!
 * On-disk and on-mirror naming for an update session
 *
 * - working file:  `<directory>/<file name>`
 * - temp artifact: `<directory>/<hex digest>`
 * - file URL:      `<base url>/<hex digest>`, signature at `<file URL>.sig`
 * - magnet:        `<version>.magnet` both locally and on the mirror
 */

use comet_core_magnet::{Digest, MAGNET_EXT};
use std::path::{Path, PathBuf};

/// Extension of the block signature published next to each file
pub const SIGNATURE_EXT: &str = ".sig";

/// Join a base URL and a name with exactly one `/` between them
pub fn join_url(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if base.is_empty() {
        return name.to_string();
    }
    format!("{}/{}", base, name)
}

/// Session-wide location context shared read-only by every tracked file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRoot {
    directory: PathBuf,
    base_url: String,
}

impl SyncRoot {
    pub fn new(directory: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            base_url: base_url.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Final location of a tracked file
    pub fn working_path(&self, file_name: &str) -> PathBuf {
        self.directory.join(file_name)
    }

    /// Content-addressed staging artifact for a target
    pub fn temp_path(&self, digest: &Digest) -> PathBuf {
        self.directory.join(digest.to_hex())
    }

    /// Mirror URL of the full target content
    pub fn file_url(&self, digest: &Digest) -> String {
        join_url(&self.base_url, &digest.to_hex())
    }

    /// Mirror URL of the target's block signature
    pub fn signature_url(&self, digest: &Digest) -> String {
        format!("{}{}", self.file_url(digest), SIGNATURE_EXT)
    }

    /// Local copy of a version's magnet
    pub fn magnet_path(&self, version: &str) -> PathBuf {
        self.directory.join(format!("{}{}", version, MAGNET_EXT))
    }

    /// Mirror URL of a version's magnet
    pub fn magnet_url(&self, version: &str) -> String {
        join_url(&self.base_url, &format!("{}{}", version, MAGNET_EXT))
    }
}
