//! Magnet data structures and file operations

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::validate::validate_magnet;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One file described by a magnet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the install directory
    pub name: String,

    /// Final size in bytes
    pub size: u64,

    /// Strong digest of the final content
    pub digest: Digest,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, size: u64, digest: Digest) -> Self {
        Self {
            name: name.into(),
            size,
            digest,
        }
    }
}

/// Version manifest: file listing plus a pointer to the next version
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Magnet {
    /// Version label this magnet describes
    pub version: String,

    /// Files in this version, in processing order
    #[serde(default)]
    pub files: Vec<FileEntry>,

    /// Version to check next; absent at the tip of the chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_version: Option<String>,
}

impl Magnet {
    /// Create an empty magnet for a version with no successor
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            files: Vec::new(),
            next_version: None,
        }
    }

    /// Set the successor version
    pub fn with_next_version(mut self, next: impl Into<String>) -> Self {
        self.next_version = Some(next.into());
        self
    }

    /// Append a file entry
    pub fn push_file(&mut self, entry: FileEntry) {
        self.files.push(entry);
    }

    /// Successor version, treating an empty label as the end of the chain
    pub fn next_version(&self) -> Option<&str> {
        self.next_version.as_deref().filter(|v| !v.is_empty())
    }

    /// Sum of all file sizes
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Load and validate a magnet from disk
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::magnet_not_found(path));
        }
        let contents = std::fs::read_to_string(path)?;
        let magnet: Magnet = serde_json::from_str(&contents)?;
        validate_magnet(&magnet)?;
        Ok(magnet)
    }

    /// Save the magnet to disk
    ///
    /// The JSON is written next to the target and renamed into place so a
    /// reader never observes a half-written magnet.
    pub fn save(&self, path: &Path) -> Result<()> {
        validate_magnet(self)?;
        let contents = serde_json::to_string_pretty(self)?;

        let temp_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!("{ext}.tmp"))
            .unwrap_or_else(|| "tmp".to_string());
        let temp_path = path.with_extension(temp_extension);

        std::fs::write(&temp_path, contents)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Whether a valid local copy exists at `path`
    pub fn check_file(path: &Path) -> bool {
        Self::load(path).is_ok()
    }
}
