/*!
 * End-to-end: publish releases into a file:// mirror, then update an
 * install directory through the real delta engine
 */

use comet::core::{publish, BulkPhase, BulkSync, ProgressPublisher, PublishOptions, RollingEngine, SyncContext};
use comet::error::Result;
use comet::transport::{LocalTransport, Transport};
use std::fs;
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const BLOCK_SIZE: usize = 1024;

/// Local mirror that counts bytes served through ranged reads and downloads
struct CountingTransport {
    inner: LocalTransport,
    ranged_bytes: AtomicU64,
    downloads: AtomicU64,
}

impl CountingTransport {
    fn new() -> Self {
        Self {
            inner: LocalTransport::new(),
            ranged_bytes: AtomicU64::new(0),
            downloads: AtomicU64::new(0),
        }
    }
}

impl Transport for CountingTransport {
    fn fetch(&self, url: &str, dest: &Path, timeout: Duration, label: &str) -> Result<()> {
        if !url.ends_with(".magnet") {
            self.downloads.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.fetch(url, dest, timeout, label)
    }

    fn fetch_bytes(&self, url: &str, range: Option<Range<u64>>, timeout: Duration) -> Result<Vec<u8>> {
        let bytes = self.inner.fetch_bytes(url, range.clone(), timeout)?;
        if range.is_some() {
            self.ranged_bytes.fetch_add(bytes.len() as u64, Ordering::SeqCst);
        }
        Ok(bytes)
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

fn pseudo_random(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        })
        .collect()
}

fn write(root: &Path, name: &str, content: &[u8]) {
    let path = root.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn options(version: &str, previous: Option<&str>, next: Option<&str>) -> PublishOptions {
    PublishOptions {
        version: version.to_string(),
        block_size: BLOCK_SIZE,
        next_version: next.map(str::to_string),
        previous_version: previous.map(str::to_string),
    }
}

#[test]
fn test_update_across_published_versions() {
    let dir = tempdir().unwrap();
    let mirror = dir.path().join("mirror");
    let install = dir.path().join("install");
    let release_v1 = dir.path().join("release-1");
    let release_v2 = dir.path().join("release-2");

    let game_v1 = pseudo_random(64 * 1024, 1);
    let map = pseudo_random(10_000, 2);
    let mut game_v2 = game_v1.clone();
    // Insert a patch in the middle: every later block shifts
    game_v2.splice(30_000..30_000, pseudo_random(700, 3));
    let notes = b"fixed the thing".to_vec();

    write(&release_v1, "game.bin", &game_v1);
    write(&release_v1, "data/map.dat", &map);
    publish(&release_v1, &mirror, &options("1", None, None)).unwrap();

    write(&release_v2, "game.bin", &game_v2);
    write(&release_v2, "data/map.dat", &map);
    write(&release_v2, "notes.txt", &notes);
    // Version 3 is announced but not published yet
    publish(&release_v2, &mirror, &options("2", Some("1"), Some("3"))).unwrap();

    // Installed: version 1
    write(&install, "game.bin", &game_v1);
    write(&install, "data/map.dat", &map);

    let transport = CountingTransport::new();
    let engine = RollingEngine::new(LocalTransport::new(), Duration::from_secs(5));
    let (progress, _subscriber) = ProgressPublisher::unbounded();
    let base_url = format!("file://{}", mirror.display());

    {
        let ctx = SyncContext::new(&engine, &transport, &progress);
        let mut session = BulkSync::new(&install, base_url.clone(), "1").unwrap();
        session.run(&ctx).unwrap();

        assert_eq!(session.phase(), BulkPhase::Done);
        assert_eq!(session.target_version(), Some("2"));
        assert_eq!(session.complete_count(), 3);
    }

    assert_eq!(fs::read(install.join("game.bin")).unwrap(), game_v2);
    assert_eq!(fs::read(install.join("data/map.dat")).unwrap(), map);
    assert_eq!(fs::read(install.join("notes.txt")).unwrap(), notes);

    // Only notes.txt needed a full download
    assert_eq!(transport.downloads.load(Ordering::SeqCst), 1);

    // No staging artifacts left behind
    let leftovers: Vec<_> = fs::read_dir(&install)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.len() == 64)
        .collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);

    // A second session finds everything current
    let ctx = SyncContext::new(&engine, &transport, &progress);
    let mut again = BulkSync::new(&install, base_url, "1").unwrap();
    again.run(&ctx).unwrap();
    assert_eq!(again.complete_count(), 3);
    assert_eq!(transport.downloads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_delta_fetches_only_changed_blocks() {
    let dir = tempdir().unwrap();
    let mirror = dir.path().join("mirror");
    let install = dir.path().join("install");
    let release = dir.path().join("release");

    let old = pseudo_random(128 * 1024, 7);
    let mut new = old.clone();
    new[70_000..70_010].copy_from_slice(b"0123456789");

    write(&release, "big.bin", &new);
    publish(&release, &mirror, &options("2", None, None)).unwrap();
    write(&install, "big.bin", &old);

    let transport = Arc::new(CountingTransport::new());
    let engine = RollingEngine::new(Arc::clone(&transport), Duration::from_secs(5));
    let progress = ProgressPublisher::noop();
    let ctx = SyncContext::new(&engine, &*transport, &progress);

    let mut session = BulkSync::new(&install, format!("file://{}", mirror.display()), "2").unwrap();
    session.run(&ctx).unwrap();

    assert_eq!(fs::read(install.join("big.bin")).unwrap(), new);
    // One block changed; a single block is all that crossed the wire
    assert_eq!(transport.ranged_bytes.load(Ordering::SeqCst), BLOCK_SIZE as u64);
    assert_eq!(transport.downloads.load(Ordering::SeqCst), 0);
}

#[test]
fn test_interrupted_download_resumes() {
    let dir = tempdir().unwrap();
    let mirror = dir.path().join("mirror");
    let install = dir.path().join("install");
    let release = dir.path().join("release");

    let content = pseudo_random(20_000, 11);
    write(&release, "asset.pak", &content);
    publish(&release, &mirror, &options("5", None, None)).unwrap();

    // A previous run died part-way through the download
    let digest = comet::core::checksum::digest_bytes(&content);
    write(&install, &digest.to_hex(), &content[..8_000]);

    let transport = LocalTransport::new();
    let engine = RollingEngine::new(LocalTransport::new(), Duration::from_secs(5));
    let (progress, subscriber) = ProgressPublisher::unbounded();
    let ctx = SyncContext::new(&engine, &transport, &progress);

    let mut session = BulkSync::new(&install, mirror.to_string_lossy(), "5").unwrap();
    session.resolve_versions(&ctx).unwrap();
    session.diff(&ctx).unwrap();
    assert_eq!(session.entries()[0].cache_size(), 8_000);

    session.patch(&ctx).unwrap();
    assert_eq!(fs::read(install.join("asset.pak")).unwrap(), content);
    assert!(!install.join(digest.to_hex()).exists());

    let events = subscriber.drain();
    assert!(!events.is_empty());
}
