/*!
 * Reference delta engine: rsync-style block matching over a mirror
 *
 * Diff:
 * 1. Fetch and decode the target's signature
 * 2. Mark blocks already staged at their final offset in the temp file
 * 3. Slide an Adler-32 window over the working file, confirming weak hits
 *    with the strong block hash
 * 4. Try the short tail block at its own offset and at the end of the
 *    working file
 *
 * Patch copies matched blocks out of the working file, fetches missing
 * runs with ranged reads, verifies every block it writes and finally the
 * whole-file digest.
 */

use super::checksum::{block_hash, RollingChecksum};
use super::signature::{read_block, MAX_BLOCK_SIZE};
use super::{BlockSource, DeltaEngine, DeltaPlan, DiffResult, Signature};
use crate::core::checksum;
use crate::error::{CometError, Result};
use crate::transport::Transport;
use comet_core_magnet::Digest;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Upper bound on a single ranged fetch
const MAX_FETCH_BYTES: usize = 4 * 1024 * 1024;

/// Delta engine over a mirror transport
pub struct RollingEngine<T: Transport> {
    transport: T,
    timeout: Duration,
}

impl<T: Transport> RollingEngine<T> {
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    fn fetch_signature(&self, url: &str) -> Result<Signature> {
        let bytes = self.transport.fetch_bytes(url, None, self.timeout)?;
        Signature::decode(&bytes)
    }
}

/// Mark blocks the temp file already holds at their final offset
fn mark_cached(temp: &Path, sig: &Signature, sources: &mut [BlockSource]) -> Result<()> {
    let file = match File::open(temp) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(CometError::fs(temp, e)),
    };
    let mut reader = BufReader::new(file);
    let mut buffer = vec![0u8; sig.block_size];

    for (index, source) in sources.iter_mut().enumerate() {
        let len = sig.block_len(index);
        let n = read_block(&mut reader, &mut buffer[..len]).map_err(|e| CometError::fs(temp, e))?;
        if n < len {
            break;
        }
        if sig.blocks[index].matches(&buffer[..len]) {
            *source = BlockSource::Cached;
        }
    }
    Ok(())
}

/// Find still-missing blocks anywhere in the working file
fn mark_matched(data: &[u8], sig: &Signature, sources: &mut [BlockSource]) {
    let block_size = sig.block_size;

    // Full-size blocks only; the short tail cannot be found by a full window
    let mut index: HashMap<u32, Vec<usize>> = HashMap::new();
    for (i, source) in sources.iter().enumerate() {
        if *source == BlockSource::Missing && sig.block_len(i) == block_size {
            index.entry(sig.blocks[i].weak).or_default().push(i);
        }
    }

    if !index.is_empty() && data.len() >= block_size {
        let mut pos = 0usize;
        let mut rolling = RollingChecksum::from_data(&data[..block_size]);

        loop {
            let mut matched = false;
            if let Some(candidates) = index.get(&rolling.checksum()) {
                let strong = block_hash(&data[pos..pos + block_size]);
                for &i in candidates {
                    if sources[i] == BlockSource::Missing && sig.blocks[i].strong == strong {
                        sources[i] = BlockSource::Matched { offset: pos as u64 };
                        matched = true;
                    }
                }
            }

            if matched {
                pos += block_size;
                if pos + block_size > data.len() {
                    break;
                }
                rolling.reset(&data[pos..pos + block_size]);
            } else {
                if pos + block_size >= data.len() {
                    break;
                }
                rolling.roll(data[pos], data[pos + block_size]);
                pos += 1;
            }
        }
    }

    let Some(tail) = sources.len().checked_sub(1) else {
        return;
    };
    let len = sig.block_len(tail);
    if len == block_size || sources[tail] != BlockSource::Missing {
        return;
    }
    let own_offset = sig.block_offset(tail) as usize;
    let candidates = [Some(own_offset), data.len().checked_sub(len)];
    for offset in candidates.into_iter().flatten() {
        if let Some(window) = data.get(offset..offset + len) {
            if sig.blocks[tail].matches(window) {
                sources[tail] = BlockSource::Matched {
                    offset: offset as u64,
                };
                return;
            }
        }
    }
}

/// Consecutive missing blocks, split so no run exceeds `max_blocks`
fn missing_runs(sources: &[BlockSource], max_blocks: usize) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;

    for (i, source) in sources.iter().enumerate() {
        match (*source == BlockSource::Missing, start) {
            (true, None) => start = Some(i),
            (true, Some(s)) if i - s == max_blocks => {
                runs.push(s..i);
                start = Some(i);
            }
            (false, Some(s)) => {
                runs.push(s..i);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(s..sources.len());
    }
    runs
}

impl<T: Transport> DeltaEngine for RollingEngine<T> {
    fn file_digest(&self, path: &Path) -> Result<Digest> {
        checksum::file_digest(path)
    }

    fn diff(&self, working: &Path, temp: &Path, signature_url: &str) -> Result<DeltaPlan> {
        let sig = self.fetch_signature(signature_url)?;
        let mut sources = vec![BlockSource::Missing; sig.block_count()];

        mark_cached(temp, &sig, &mut sources)?;

        if sources.contains(&BlockSource::Missing) {
            let data = match std::fs::read(working) {
                Ok(data) => data,
                Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
                Err(e) => return Err(CometError::fs(working, e)),
            };
            mark_matched(&data, &sig, &mut sources);
        }

        let result = DiffResult::from_sources(sources);
        debug!(
            blocks = sig.block_count(),
            matched = result.match_num,
            cached = result.cache_num,
            missing = result.missing_num(),
            "diff complete"
        );
        Ok(DeltaPlan::new(sig, result))
    }

    fn patch(&self, working: &Path, temp: &Path, file_url: &str, plan: &DeltaPlan) -> Result<()> {
        let info = &plan.info;
        let sources = &plan.result.sources;
        if info.block_size == 0 || info.block_size > MAX_BLOCK_SIZE {
            return Err(CometError::engine(format!(
                "plan block size {} out of range",
                info.block_size
            )));
        }
        if sources.len() != info.block_count() {
            return Err(CometError::engine(format!(
                "plan covers {} blocks, signature has {}",
                sources.len(),
                info.block_count()
            )));
        }

        let mut out = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(temp)
            .map_err(|e| CometError::fs(temp, e))?;
        out.set_len(info.file_size)
            .map_err(|e| CometError::fs(temp, e))?;

        // Blocks reused from the working file
        if plan.result.match_num > 0 {
            let mut source = File::open(working).map_err(|e| CometError::fs(working, e))?;
            let mut buffer = vec![0u8; info.block_size];

            for (i, block) in sources.iter().enumerate() {
                let BlockSource::Matched { offset } = *block else {
                    continue;
                };
                let len = info.block_len(i);
                source
                    .seek(SeekFrom::Start(offset))
                    .and_then(|_| source.read_exact(&mut buffer[..len]))
                    .map_err(|e| CometError::fs(working, e))?;
                if !info.blocks[i].matches(&buffer[..len]) {
                    return Err(CometError::engine(format!(
                        "block {} changed in working file since diff",
                        i
                    )));
                }
                out.seek(SeekFrom::Start(info.block_offset(i)))
                    .and_then(|_| out.write_all(&buffer[..len]))
                    .map_err(|e| CometError::fs(temp, e))?;
            }
        }

        // Blocks fetched from the mirror
        let max_blocks = (MAX_FETCH_BYTES / info.block_size).max(1);
        for run in missing_runs(sources, max_blocks) {
            let start = info.block_offset(run.start);
            let end = info.block_offset(run.end).min(info.file_size);
            let bytes = self.transport.fetch_bytes(file_url, Some(start..end), self.timeout)?;
            if bytes.len() as u64 != end - start {
                return Err(CometError::transfer(
                    file_url,
                    format!("expected {} bytes, got {}", end - start, bytes.len()),
                ));
            }

            for i in run.clone() {
                let at = (info.block_offset(i) - start) as usize;
                let len = info.block_len(i);
                if !info.blocks[i].matches(&bytes[at..at + len]) {
                    return Err(CometError::engine(format!(
                        "block {} from mirror failed verification",
                        i
                    )));
                }
            }

            out.seek(SeekFrom::Start(start))
                .and_then(|_| out.write_all(&bytes))
                .map_err(|e| CometError::fs(temp, e))?;
            debug!(blocks = run.len(), bytes = bytes.len(), "fetched missing run");
        }

        out.sync_all().map_err(|e| CometError::fs(temp, e))?;
        drop(out);

        let digest = checksum::file_digest(temp)?;
        if digest != info.digest {
            return Err(CometError::engine(format!(
                "reconstructed digest {} does not match {}",
                digest, info.digest
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalTransport;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    const BLOCK: usize = 16;

    fn target_data() -> Vec<u8> {
        (0..100u8).map(|i| i.wrapping_mul(37).wrapping_add(11)).collect()
    }

    /// Write a target and its signature into a mirror directory
    fn publish(dir: &TempDir, data: &[u8]) -> (String, String, Digest) {
        let mirror = dir.path().join("mirror");
        fs::create_dir_all(&mirror).unwrap();
        let sig = Signature::from_reader(data, BLOCK).unwrap();
        let hex = sig.digest.to_hex();
        fs::write(mirror.join(&hex), data).unwrap();
        fs::write(mirror.join(format!("{}.sig", hex)), sig.encode().unwrap()).unwrap();
        let file_url = mirror.join(&hex).to_string_lossy().into_owned();
        let sig_url = format!("{}.sig", file_url);
        (file_url, sig_url, sig.digest)
    }

    fn engine() -> RollingEngine<LocalTransport> {
        RollingEngine::new(LocalTransport::new(), Duration::from_secs(1))
    }

    fn paths(dir: &TempDir) -> (PathBuf, PathBuf) {
        (dir.path().join("working"), dir.path().join("temp"))
    }

    #[test]
    fn test_shifted_content_is_matched() {
        let dir = tempdir().unwrap();
        let data = target_data();
        let (file_url, sig_url, _) = publish(&dir, &data);
        let (working, temp) = paths(&dir);

        // Stale copy: a prefix inserted shifts every block
        let mut stale = b"xyz".to_vec();
        stale.extend_from_slice(&data);
        fs::write(&working, &stale).unwrap();

        let plan = engine().diff(&working, &temp, &sig_url).unwrap();
        assert_eq!(plan.result.match_num, plan.info.block_count());
        assert_eq!(plan.result.cache_num, 0);
        assert_eq!(plan.reusable_bytes(), data.len() as u64);

        engine().patch(&working, &temp, &file_url, &plan).unwrap();
        assert_eq!(fs::read(&temp).unwrap(), data);
    }

    #[test]
    fn test_changed_block_is_fetched() {
        let dir = tempdir().unwrap();
        let data = target_data();
        let (file_url, sig_url, digest) = publish(&dir, &data);
        let (working, temp) = paths(&dir);

        let mut stale = data.clone();
        stale[40] ^= 0xFF;
        fs::write(&working, &stale).unwrap();

        let plan = engine().diff(&working, &temp, &sig_url).unwrap();
        assert_eq!(plan.result.missing_num(), 1);
        assert_eq!(plan.result.sources[2], BlockSource::Missing);

        engine().patch(&working, &temp, &file_url, &plan).unwrap();
        assert_eq!(engine().file_digest(&temp).unwrap(), digest);
    }

    #[test]
    fn test_staged_temp_blocks_are_cached() {
        let dir = tempdir().unwrap();
        let data = target_data();
        let (file_url, sig_url, _) = publish(&dir, &data);
        let (working, temp) = paths(&dir);

        fs::write(&working, b"unrelated").unwrap();
        fs::write(&temp, &data[..3 * BLOCK + 5]).unwrap();

        let plan = engine().diff(&working, &temp, &sig_url).unwrap();
        assert_eq!(plan.result.cache_num, 3);
        assert_eq!(plan.result.match_num, 0);

        engine().patch(&working, &temp, &file_url, &plan).unwrap();
        assert_eq!(fs::read(&temp).unwrap(), data);
    }

    #[test]
    fn test_tail_block_found_at_end_of_working_file() {
        let dir = tempdir().unwrap();
        let data = target_data();
        let (_, sig_url, _) = publish(&dir, &data);
        let (working, temp) = paths(&dir);

        // 100 bytes at block 16 leaves a 4-byte tail
        let mut stale = vec![0u8; 7];
        stale.extend_from_slice(&data[96..]);
        fs::write(&working, &stale).unwrap();

        let plan = engine().diff(&working, &temp, &sig_url).unwrap();
        assert_eq!(plan.result.sources[6], BlockSource::Matched { offset: 7 });
    }

    #[test]
    fn test_missing_signature_is_transfer_error() {
        let dir = tempdir().unwrap();
        let (working, temp) = paths(&dir);
        fs::write(&working, b"data").unwrap();

        let err = engine()
            .diff(&working, &temp, dir.path().join("absent.sig").to_str().unwrap())
            .unwrap_err();
        assert!(matches!(err, CometError::Transfer { .. }));
    }

    #[test]
    fn test_oversized_block_size_is_engine_error() {
        let dir = tempdir().unwrap();
        let (working, temp) = paths(&dir);
        fs::write(&working, b"abcd").unwrap();
        fs::write(&temp, b"ab").unwrap();

        let hostile = Signature {
            block_size: usize::MAX,
            file_size: 4,
            digest: checksum::digest_bytes(b"abcd"),
            blocks: vec![crate::core::delta::BlockSum::of(b"abcd")],
        };
        let sig_path = dir.path().join("hostile.sig");
        fs::write(&sig_path, hostile.encode().unwrap()).unwrap();

        let err = engine()
            .diff(&working, &temp, sig_path.to_str().unwrap())
            .unwrap_err();
        assert!(matches!(err, CometError::Engine(_)));

        let plan = DeltaPlan::new(
            hostile,
            DiffResult::from_sources(vec![BlockSource::Matched { offset: 0 }]),
        );
        let err = engine()
            .patch(&working, &temp, "unused", &plan)
            .unwrap_err();
        assert!(matches!(err, CometError::Engine(_)));
    }

    #[test]
    fn test_corrupt_mirror_block_is_rejected() {
        let dir = tempdir().unwrap();
        let data = target_data();
        let (file_url, sig_url, _) = publish(&dir, &data);
        let (working, temp) = paths(&dir);

        let plan = engine().diff(&working, &temp, &sig_url).unwrap();
        assert_eq!(plan.result.missing_num(), plan.info.block_count());

        let mut corrupt = data.clone();
        corrupt[0] ^= 1;
        fs::write(&file_url, &corrupt).unwrap();

        let err = engine().patch(&working, &temp, &file_url, &plan).unwrap_err();
        assert!(matches!(err, CometError::Engine(_)));
    }

    #[test]
    fn test_missing_runs_are_coalesced_and_split() {
        use BlockSource::*;
        let sources = [Missing, Missing, Cached, Missing, Missing, Missing, Matched { offset: 0 }];
        assert_eq!(missing_runs(&sources, 8), vec![0..2, 3..6]);
        assert_eq!(missing_runs(&sources, 2), vec![0..2, 3..5, 5..6]);
        assert_eq!(missing_runs(&[Missing; 3], 8), vec![0..3]);
        assert!(missing_runs(&[], 8).is_empty());
    }
}
