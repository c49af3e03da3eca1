/*!
 * Mirror transports
 *
 * A transport fetches mirror objects either to a local path (resumable)
 * or into memory (optionally a byte range). `for_base_url` picks the
 * implementation from the mirror URL scheme.
 */

pub mod http;
pub mod local;

pub use http::HttpTransport;
pub use local::LocalTransport;

use crate::error::Result;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Access to a mirror
pub trait Transport: Send + Sync {
    /// Download `url` to `dest`.
    ///
    /// An existing partial `dest` is resumed rather than restarted. On
    /// failure, whatever was written stays in place for the next attempt.
    fn fetch(&self, url: &str, dest: &Path, timeout: Duration, label: &str) -> Result<()>;

    /// Read `url` (or the given byte range of it) into memory
    fn fetch_bytes(&self, url: &str, range: Option<Range<u64>>, timeout: Duration)
        -> Result<Vec<u8>>;

    /// Get the transport name (for logging)
    fn name(&self) -> &'static str;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn fetch(&self, url: &str, dest: &Path, timeout: Duration, label: &str) -> Result<()> {
        (**self).fetch(url, dest, timeout, label)
    }

    fn fetch_bytes(
        &self,
        url: &str,
        range: Option<Range<u64>>,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        (**self).fetch_bytes(url, range, timeout)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Select a transport for a mirror base URL
pub fn for_base_url(base_url: &str) -> Result<Arc<dyn Transport>> {
    let lower = base_url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Ok(Arc::new(HttpTransport::new()?))
    } else {
        Ok(Arc::new(LocalTransport::new()))
    }
}
