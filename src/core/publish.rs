/*!
 * Mirror-side publishing of a release
 *
 * Lays out a release directory the way clients expect to find it:
 * `<hex>` content objects, `<hex>.sig` block signatures and a
 * `<version>.magnet` listing, optionally chained from the previous version.
 */

use super::delta::Signature;
use super::layout::SIGNATURE_EXT;
use crate::error::{CometError, Result};
use comet_core_magnet::{validate_file_name, FileEntry, Magnet, MAGNET_EXT};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// What to publish
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub version: String,
    pub block_size: usize,
    /// Successor label to announce ahead of its release
    pub next_version: Option<String>,
    /// Already-published version to chain onto this one
    pub previous_version: Option<String>,
}

/// Outcome of a publish run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub magnet_path: PathBuf,
    pub files: usize,
    pub total_bytes: u64,
    /// Content objects written (unchanged files reuse existing objects)
    pub new_objects: usize,
    pub linked_previous: Option<String>,
}

fn magnet_file_name(version: &str) -> Result<String> {
    let name = format!("{}{}", version, MAGNET_EXT);
    if version.is_empty() {
        return Err(CometError::InvalidArgument("version is empty".to_string()));
    }
    validate_file_name(&name)
        .map_err(|e| CometError::InvalidArgument(format!("version {:?}: {}", version, e)))?;
    Ok(name)
}

/// Magnet entry name of a release file: relative, `/`-separated
fn entry_name(release_dir: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(release_dir)
        .map_err(|_| CometError::InvalidArgument(format!("{} escapes release", path.display())))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            _ => {
                return Err(CometError::InvalidArgument(format!(
                    "unexpected path component in {}",
                    relative.display()
                )))
            }
        }
    }
    Ok(parts.join("/"))
}

/// Copy a file into place through a temporary name
fn copy_atomic(from: &Path, to: &Path) -> Result<()> {
    let staging = to.with_extension("tmp");
    fs::copy(from, &staging).map_err(|e| CometError::fs(from, e))?;
    fs::rename(&staging, to).map_err(|e| CometError::fs(to, e))
}

/// Publish every file under `release_dir` into the mirror directory `out_dir`
pub fn publish(release_dir: &Path, out_dir: &Path, options: &PublishOptions) -> Result<PublishReport> {
    let magnet_name = magnet_file_name(&options.version)?;
    if let Some(ref next) = options.next_version {
        magnet_file_name(next)?;
    }
    if options.block_size == 0 {
        return Err(CometError::InvalidArgument(
            "block size must be positive".to_string(),
        ));
    }
    if !release_dir.is_dir() {
        return Err(CometError::InvalidArgument(format!(
            "{} is not a directory",
            release_dir.display()
        )));
    }

    fs::create_dir_all(out_dir).map_err(|e| CometError::fs(out_dir, e))?;
    let release_canon = release_dir
        .canonicalize()
        .map_err(|e| CometError::fs(release_dir, e))?;
    let out_canon = out_dir
        .canonicalize()
        .map_err(|e| CometError::fs(out_dir, e))?;
    if out_canon.starts_with(&release_canon) {
        return Err(CometError::InvalidArgument(
            "output directory must be outside the release directory".to_string(),
        ));
    }

    let mut magnet = Magnet::new(options.version.clone());
    magnet.next_version = options.next_version.clone();
    let mut new_objects = 0;

    for entry in WalkDir::new(release_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| CometError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry_name(release_dir, entry.path())?;
        let signature = Signature::generate(entry.path(), options.block_size)?;
        let hex = signature.digest.to_hex();

        let object = out_dir.join(&hex);
        let present = fs::metadata(&object)
            .map(|m| m.len() == signature.file_size)
            .unwrap_or(false);
        if !present {
            copy_atomic(entry.path(), &object)?;
            new_objects += 1;
        }

        let sig_path = out_dir.join(format!("{}{}", hex, SIGNATURE_EXT));
        fs::write(&sig_path, signature.encode()?).map_err(|e| CometError::fs(&sig_path, e))?;

        debug!(file = %name, digest = %hex, size = signature.file_size, "published");
        magnet.push_file(FileEntry::new(name, signature.file_size, signature.digest));
    }

    let magnet_path = out_dir.join(&magnet_name);
    magnet.save(&magnet_path)?;

    let linked_previous = match options.previous_version {
        Some(ref previous) => {
            let previous_path = out_dir.join(magnet_file_name(previous)?);
            let mut previous_magnet = Magnet::load(&previous_path)?;
            previous_magnet.next_version = Some(options.version.clone());
            previous_magnet.save(&previous_path)?;
            Some(previous.clone())
        }
        None => None,
    };

    info!(
        version = %options.version,
        files = magnet.files.len(),
        bytes = magnet.total_size(),
        new_objects,
        "release published"
    );

    Ok(PublishReport {
        magnet_path,
        files: magnet.files.len(),
        total_bytes: magnet.total_size(),
        new_objects,
        linked_previous,
    })
}
