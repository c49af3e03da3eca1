/*!
 * HTTP(S) mirror using a blocking reqwest client
 */

use super::Transport;
use crate::error::{CometError, Result};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::RANGE;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Read};
use std::ops::Range;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// HTTP(S) mirror
///
/// The timeout passed to each call bounds connecting, waiting for the
/// response headers and every single body read. A download that keeps
/// receiving data never times out, however long it takes; one that stalls
/// for longer than the timeout fails and is resumed on the next run.
pub struct HttpTransport {
    /// One client per timeout, built on first use
    clients: Mutex<HashMap<Duration, Client>>,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let transport = Self {
            clients: Mutex::new(HashMap::new()),
        };
        // Surface TLS/backend setup problems up front
        transport.client(DEFAULT_TIMEOUT)?;
        Ok(transport)
    }

    /// Client whose connect and per-read timeouts are `timeout`
    ///
    /// A per-request timeout would cap the whole transfer instead, so the
    /// limit lives on the client.
    fn client(&self, timeout: Duration) -> Result<Client> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| CometError::Config("HTTP client cache poisoned".to_string()))?;
        if let Some(client) = clients.get(&timeout) {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .user_agent(concat!("comet/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| CometError::Config(format!("Failed to build HTTP client: {}", e)))?;
        clients.insert(timeout, client.clone());
        Ok(client)
    }

    fn send(url: &str, request: RequestBuilder) -> Result<reqwest::blocking::Response> {
        request.send().map_err(|e| CometError::transfer(url, e))
    }
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// `Range` header value for resuming from `offset`
fn resume_header(offset: u64) -> String {
    format!("bytes={}-", offset)
}

/// `Range` header value for a half-open byte range
fn range_header(range: &Range<u64>) -> String {
    format!("bytes={}-{}", range.start, range.end.saturating_sub(1))
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str, dest: &Path, timeout: Duration, label: &str) -> Result<()> {
        let existing = match fs::metadata(dest) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(CometError::fs(dest, e)),
        };

        let mut request = self.client(timeout)?.get(url);
        if existing > 0 {
            request = request.header(RANGE, resume_header(existing));
        }
        let mut response = Self::send(url, request)?;

        let append = match response.status() {
            StatusCode::PARTIAL_CONTENT => true,
            StatusCode::OK => false,
            // Nothing left past what we already have
            StatusCode::RANGE_NOT_SATISFIABLE if existing > 0 => {
                debug!(label, existing, "already fully downloaded");
                return Ok(());
            }
            status => {
                return Err(CometError::transfer(url, format!("HTTP status {}", status)));
            }
        };

        let expected = response.content_length();
        let mut out = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(dest)
            .map_err(|e| CometError::fs(dest, e))?;

        let written = response
            .copy_to(&mut out)
            .map_err(|e| CometError::transfer(url, e))?;

        if let Some(expected) = expected {
            if written != expected {
                return Err(CometError::transfer(
                    url,
                    format!("body truncated: {} of {} bytes", written, expected),
                ));
            }
        }

        info!(
            label,
            resumed = append,
            offset = if append { existing } else { 0 },
            bytes = written,
            "download finished"
        );
        Ok(())
    }

    fn fetch_bytes(
        &self,
        url: &str,
        range: Option<Range<u64>>,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let mut request = self.client(timeout)?.get(url);
        if let Some(ref range) = range {
            if range.is_empty() {
                return Ok(Vec::new());
            }
            request = request.header(RANGE, range_header(range));
        }
        let mut response = Self::send(url, request)?;
        let status = response.status();
        if !status.is_success() {
            return Err(CometError::transfer(url, format!("HTTP status {}", status)));
        }

        let mut body = Vec::new();
        response
            .read_to_end(&mut body)
            .map_err(|e| CometError::transfer(url, e))?;

        let Some(range) = range else {
            return Ok(body);
        };
        let wanted = (range.end - range.start) as usize;

        // Servers that ignore Range answer 200 with the whole body
        let slice = if status == StatusCode::PARTIAL_CONTENT {
            &body[..]
        } else {
            let start = range.start as usize;
            body.get(start..start + wanted).unwrap_or(&[])
        };

        if slice.len() != wanted {
            return Err(CometError::transfer(
                url,
                format!("expected {} bytes, got {}", wanted, slice.len()),
            ));
        }
        Ok(slice.to_vec())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
