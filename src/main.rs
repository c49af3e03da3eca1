/*!
 * Comet CLI - Command Line Interface
 *
 * Version: 0.6.0
 * Author: Shane Wall <shaneawall@gmail.com>
 */

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use comet::{
    cli_progress::{format_bytes, CliProgressRenderer},
    config::{LogLevel, UpdateConfig},
    core::{publish, BulkSync, ProgressPublisher, PublishOptions, RollingEngine, SyncContext},
    error::{CometError, EXIT_FATAL, EXIT_SUCCESS},
    logging, transport,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "comet")]
#[command(version, about = "Resumable delta updates for installed file sets", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Write logs to this file as JSON instead of stderr
    #[arg(long = "log", value_name = "FILE", global = true)]
    log: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Update an installed file set to the newest published version
    Update(UpdateArgs),

    /// Publish a release directory into a mirror directory
    Publish(PublishArgs),
}

#[derive(Args)]
struct UpdateArgs {
    /// Install directory
    #[arg(short = 'd', long, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Mirror base URL (http://, https://, file:// or a path)
    #[arg(short = 'u', long, value_name = "URL")]
    base_url: Option<String>,

    /// Installed version to start the chain walk from
    #[arg(short = 'f', long = "from", value_name = "VERSION")]
    current_version: Option<String>,

    /// File download timeout in seconds
    #[arg(long, value_name = "SECS")]
    file_timeout: Option<u64>,

    /// Magnet download timeout in seconds
    #[arg(long, value_name = "SECS")]
    magnet_timeout: Option<u64>,

    /// Resolve and diff only; report what would be transferred
    #[arg(long)]
    dry_run: bool,

    /// Disable progress output
    #[arg(long)]
    no_progress: bool,
}

impl UpdateArgs {
    fn apply(&self, config: &mut UpdateConfig) {
        if let Some(ref dir) = self.directory {
            config.directory = dir.clone();
        }
        if let Some(ref url) = self.base_url {
            config.base_url = url.clone();
        }
        if let Some(ref version) = self.current_version {
            config.current_version = version.clone();
        }
        if let Some(secs) = self.file_timeout {
            config.file_timeout_secs = secs;
        }
        if let Some(secs) = self.magnet_timeout {
            config.magnet_timeout_secs = secs;
        }
        if self.no_progress {
            config.show_progress = false;
        }
    }
}

#[derive(Args)]
struct PublishArgs {
    /// Release directory to publish
    #[arg(value_name = "RELEASE_DIR")]
    release: PathBuf,

    /// Mirror directory to write into
    #[arg(short = 'o', long = "out", value_name = "DIR")]
    out: PathBuf,

    /// Version label of this release
    #[arg(short = 'l', long = "label", value_name = "VERSION")]
    label: String,

    /// Block size for signatures in bytes
    #[arg(long, value_name = "BYTES")]
    block_size: Option<usize>,

    /// Announce the label of the next release
    #[arg(long, value_name = "VERSION")]
    next: Option<String>,

    /// Link this release from an already published version
    #[arg(long, value_name = "VERSION")]
    previous: Option<String>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            failure_exit_code(&e)
        }
    };
    std::process::exit(code);
}

/// Exit code for a failed run; hints at resuming when a rerun can help
fn failure_exit_code(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<CometError>() {
        Some(err) => {
            if !err.is_fatal() {
                eprintln!("Progress so far is kept; run the update again to resume.");
            }
            err.exit_code()
        }
        None => EXIT_FATAL,
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => UpdateConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => UpdateConfig::default(),
    };

    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if cli.log.is_some() {
        config.log_file = cli.log.clone();
    }
    config.verbose |= cli.verbose;

    if let Err(e) = logging::init_logging(&config) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Update(args) => update(config, &args),
        Commands::Publish(args) => publish_release(&config, &args),
    }
}

fn update(mut config: UpdateConfig, args: &UpdateArgs) -> anyhow::Result<()> {
    args.apply(&mut config);
    config.validate()?;

    let transport = transport::for_base_url(&config.base_url)?;
    let engine = RollingEngine::new(Arc::clone(&transport), config.file_timeout());

    let (progress, renderer) = if config.show_progress {
        let (publisher, subscriber) = ProgressPublisher::unbounded();
        let handle = CliProgressRenderer::new(subscriber, config.verbose).spawn();
        (publisher, Some(handle))
    } else {
        (ProgressPublisher::noop(), None)
    };

    let mut session = BulkSync::from_config(&config)?;
    let result = {
        let ctx = SyncContext::new(&engine, transport.as_ref(), &progress)
            .with_timeouts(config.file_timeout(), config.magnet_timeout());
        if args.dry_run {
            session
                .resolve_versions(&ctx)
                .and_then(|_| session.diff(&ctx))
        } else {
            session.run(&ctx)
        }
    };

    // Closing the channel lets the renderer drain and exit
    drop(progress);
    if let Some(handle) = renderer {
        let _ = handle.join();
    }
    result?;

    let target = session.target_version().unwrap_or(&config.current_version);
    if args.dry_run {
        let pending: Vec<_> = session.entries().iter().filter(|e| !e.is_complete()).collect();
        let to_fetch: u64 = pending
            .iter()
            .map(|e| e.file_size().saturating_sub(e.cache_size()))
            .sum();
        println!(
            "{} -> {}: {} of {} file(s) need updating, about {} to download",
            config.current_version,
            target,
            pending.len(),
            session.entries().len(),
            format_bytes(to_fetch)
        );
    } else {
        println!("Installed version is now {}", target);
    }
    Ok(())
}

fn publish_release(config: &UpdateConfig, args: &PublishArgs) -> anyhow::Result<()> {
    let options = PublishOptions {
        version: args.label.clone(),
        block_size: args.block_size.unwrap_or(config.block_size),
        next_version: args.next.clone(),
        previous_version: args.previous.clone(),
    };

    let report = publish(&args.release, &args.out, &options)
        .with_context(|| format!("publishing {}", args.release.display()))?;

    println!(
        "Published {} file(s), {} ({} new object(s)) -> {}",
        report.files,
        format_bytes(report.total_bytes),
        report.new_objects,
        report.magnet_path.display()
    );
    if let Some(previous) = report.linked_previous {
        println!("Linked {} -> {}", previous, options.version);
    }
    Ok(())
}
