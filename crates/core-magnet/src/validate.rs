//! Structural validation for magnets

use crate::error::{Error, Result};
use crate::magnet::Magnet;
use std::collections::HashSet;
use std::path::{Component, Path};

/// Validate a magnet before it is used or written
pub fn validate_magnet(magnet: &Magnet) -> Result<()> {
    if magnet.version.trim().is_empty() {
        return Err(Error::validation("magnet version must not be empty"));
    }

    let mut seen = HashSet::new();
    for file in &magnet.files {
        validate_file_name(&file.name)?;
        if !seen.insert(file.name.as_str()) {
            return Err(Error::validation(format!(
                "duplicate file name in magnet {}: {}",
                magnet.version, file.name
            )));
        }
    }

    Ok(())
}

/// Check that a file name stays inside the install directory
pub fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation("file name must not be empty"));
    }

    let path = Path::new(name);
    let mut normal = 0;
    for component in path.components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
            _ => {
                return Err(Error::validation(format!(
                    "file name must be a relative path without '..': {}",
                    name
                )))
            }
        }
    }

    // "." or "./" would name the install directory itself
    if normal == 0 || name.ends_with('/') {
        return Err(Error::validation(format!(
            "file name must name a file: {}",
            name
        )));
    }

    Ok(())
}
