/*!
 * CLI progress renderer for interactive terminal display
 *
 * Subscribes to progress events and renders one line per file state
 * change, plus a summary when the session ends.
 */

use crate::core::progress::{ProgressEvent, ProgressSubscriber, SyncPass};
use std::collections::HashMap;
use std::io::{self, Write};
use std::thread;
use std::time::Instant;

/// Last known state of a tracked file
struct FileState {
    cache_size: u64,
    file_size: u64,
    generation: u32,
}

impl FileState {
    fn progress_pct(&self) -> f64 {
        if self.file_size > 0 {
            (self.cache_size as f64 / self.file_size as f64) * 100.0
        } else {
            100.0
        }
    }
}

/// CLI progress renderer
pub struct CliProgressRenderer {
    subscriber: ProgressSubscriber,
    files: HashMap<String, FileState>,
    started: Instant,
    verbose: bool,
}

impl CliProgressRenderer {
    /// Create a new CLI progress renderer
    pub fn new(subscriber: ProgressSubscriber, verbose: bool) -> Self {
        Self {
            subscriber,
            files: HashMap::new(),
            started: Instant::now(),
            verbose,
        }
    }

    /// Run the progress renderer in the current thread
    pub fn run(mut self) -> io::Result<()> {
        while let Some(event) = self.subscriber.recv() {
            self.handle_event(event)?;
        }
        Ok(())
    }

    /// Spawn the renderer in a background thread
    pub fn spawn(self) -> thread::JoinHandle<io::Result<()>> {
        thread::spawn(move || self.run())
    }

    /// Handle a single progress event
    fn handle_event(&mut self, event: ProgressEvent) -> io::Result<()> {
        let mut out = io::stdout().lock();

        match event {
            ProgressEvent::VersionResolved {
                current_version,
                latest_version,
                ..
            } => match latest_version {
                Some(latest) => writeln!(out, "Updating {} -> {}", current_version, latest)?,
                None => writeln!(out, "Version {} is the newest published", current_version)?,
            },

            ProgressEvent::PassStarted {
                pass,
                pending_files,
                ..
            } => {
                let verb = match pass {
                    SyncPass::Diff => "Checking",
                    SyncPass::Patch => "Updating",
                };
                writeln!(out, "\n{} {} file(s)", verb, pending_files)?;
            }

            ProgressEvent::FileProgress {
                file_name,
                cache_size,
                file_size,
                is_complete,
                generation,
                ..
            } => {
                let state = self.files.entry(file_name.clone()).or_insert(FileState {
                    cache_size: 0,
                    file_size,
                    generation: 0,
                });
                // Late events from an earlier call carry nothing new
                if generation < state.generation {
                    return Ok(());
                }
                state.cache_size = cache_size;
                state.file_size = file_size;
                state.generation = generation;

                if is_complete {
                    writeln!(out, "   ✓ {} ({})", file_name, format_bytes(file_size))?;
                } else {
                    write!(out, "   ")?;
                    write!(out, "{}", progress_bar(state.progress_pct(), 30))?;
                    write!(out, " {:>6.1}%  {}", state.progress_pct(), file_name)?;
                    if self.verbose {
                        write!(
                            out,
                            "  ({} of {} reusable)",
                            format_bytes(cache_size),
                            format_bytes(file_size)
                        )?;
                    }
                    writeln!(out)?;
                }
            }

            ProgressEvent::SessionFinished {
                succeeded,
                complete_files,
                total_files,
                ..
            } => {
                let elapsed = self.started.elapsed().as_secs();
                if succeeded {
                    writeln!(
                        out,
                        "\nUp to date: {} file(s) in {}",
                        total_files,
                        format_duration(elapsed)
                    )?;
                } else {
                    writeln!(
                        out,
                        "\n✗ Update stopped: {}/{} file(s) complete after {}",
                        complete_files,
                        total_files,
                        format_duration(elapsed)
                    )?;
                }
            }
        }

        out.flush()
    }
}

/// Text-based progress bar
fn progress_bar(percentage: f64, width: usize) -> String {
    let filled = (((percentage / 100.0) * width as f64) as usize).min(width);
    let empty = width - filled;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Format duration in human-readable format
fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
