/*!
 * Local filesystem mirror
 *
 * Serves `file://` URLs and bare paths, for LAN shares and tests.
 */

use super::Transport;
use crate::error::{CometError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Local filesystem mirror
pub struct LocalTransport;

impl LocalTransport {
    pub fn new() -> Self {
        Self
    }

    /// Map a mirror URL to a local path
    pub fn resolve(url: &str) -> PathBuf {
        match url.strip_prefix("file://") {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(url),
        }
    }

    fn open_source(url: &str) -> Result<(File, u64)> {
        let path = Self::resolve(url);
        let file = File::open(&path).map_err(|e| CometError::transfer(url, e))?;
        let len = file
            .metadata()
            .map_err(|e| CometError::transfer(url, e))?
            .len();
        Ok((file, len))
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for LocalTransport {
    fn fetch(&self, url: &str, dest: &Path, _timeout: Duration, label: &str) -> Result<()> {
        let (mut source, total) = Self::open_source(url)?;

        let existing = match fs::metadata(dest) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(CometError::fs(dest, e)),
        };

        if existing == total {
            debug!(label, "already fully present");
            return Ok(());
        }

        // A destination longer than the source cannot be a prefix of it
        let resume_from = if existing < total { existing } else { 0 };
        let mut out = OpenOptions::new()
            .create(true)
            .write(true)
            .append(resume_from > 0)
            .truncate(resume_from == 0)
            .open(dest)
            .map_err(|e| CometError::fs(dest, e))?;

        source
            .seek(SeekFrom::Start(resume_from))
            .map_err(|e| CometError::transfer(url, e))?;
        let copied = io::copy(&mut source, &mut out).map_err(|e| CometError::transfer(url, e))?;

        if resume_from + copied != total {
            return Err(CometError::transfer(
                url,
                format!("short copy: {} of {} bytes", resume_from + copied, total),
            ));
        }

        debug!(label, resume_from, bytes = copied, "fetched from local mirror");
        Ok(())
    }

    fn fetch_bytes(
        &self,
        url: &str,
        range: Option<Range<u64>>,
        _timeout: Duration,
    ) -> Result<Vec<u8>> {
        let (mut source, total) = Self::open_source(url)?;
        let range = range.unwrap_or(0..total);

        if range.start > range.end || range.end > total {
            return Err(CometError::transfer(
                url,
                format!("range {}..{} outside {} bytes", range.start, range.end, total),
            ));
        }

        source
            .seek(SeekFrom::Start(range.start))
            .map_err(|e| CometError::transfer(url, e))?;
        let mut buffer = vec![0u8; (range.end - range.start) as usize];
        source
            .read_exact(&mut buffer)
            .map_err(|e| CometError::transfer(url, e))?;
        Ok(buffer)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[test]
    fn test_resolve_file_url() {
        assert_eq!(
            LocalTransport::resolve("file:///srv/mirror/a"),
            PathBuf::from("/srv/mirror/a")
        );
        assert_eq!(LocalTransport::resolve("/srv/mirror/a"), PathBuf::from("/srv/mirror/a"));
    }

    #[test]
    fn test_fetch_full() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::write(&src, b"full content").unwrap();

        let url = format!("file://{}", src.display());
        LocalTransport::new().fetch(&url, &dest, TIMEOUT, "src").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"full content");
    }

    #[test]
    fn test_fetch_resumes_partial() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::write(&src, b"0123456789").unwrap();
        fs::write(&dest, b"0123").unwrap();

        LocalTransport::new()
            .fetch(src.to_str().unwrap(), &dest, TIMEOUT, "src")
            .unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"0123456789");
    }

    #[test]
    fn test_fetch_restarts_oversized_destination() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::write(&src, b"abc").unwrap();
        fs::write(&dest, b"something longer").unwrap();

        LocalTransport::new()
            .fetch(src.to_str().unwrap(), &dest, TIMEOUT, "src")
            .unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"abc");
    }

    #[test]
    fn test_missing_source_is_transfer_error() {
        let dir = tempdir().unwrap();
        let err = LocalTransport::new()
            .fetch(
                dir.path().join("absent").to_str().unwrap(),
                &dir.path().join("dest"),
                TIMEOUT,
                "absent",
            )
            .unwrap_err();
        assert!(matches!(err, CometError::Transfer { .. }));
        assert!(!dir.path().join("dest").exists());
    }

    #[test]
    fn test_fetch_bytes_range() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::write(&src, b"0123456789").unwrap();
        let url = src.to_str().unwrap();

        let transport = LocalTransport::new();
        assert_eq!(transport.fetch_bytes(url, Some(2..5), TIMEOUT).unwrap(), b"234");
        assert_eq!(transport.fetch_bytes(url, None, TIMEOUT).unwrap(), b"0123456789");
        assert!(transport.fetch_bytes(url, Some(8..12), TIMEOUT).is_err());
    }
}
