use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use tracing_appender::non_blocking;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

mod auto_concurrency;
mod cli;
mod config;
mod error;
mod facade;
mod fingerprint;
mod model;
mod packager;
mod queue;
mod scanner;
mod stability;
mod transport;
mod util;

pub use error::{MkdirError, ScanError, StageError, TransportError, TransportErrorCode};

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let cli::Commands::Run {
        config: config_path,
        root,
        output,
        max_concurrent_checks,
        max_concurrent_transfers,
        dry_run,
        json,
        debug,
        retry_backoff_ms,
        auto_concurrency,
    } = cli.command;

    init_tracing(&config_path, debug);

    let mut config = config::Config::read_from(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    if let Some(root) = root {
        config.root_dir = root;
    }
    if let Some(output) = output {
        config.output_dir = output;
    }
    if let Some(n) = max_concurrent_checks {
        config.queue.max_concurrent_file_checks = n;
    }
    if let Some(n) = max_concurrent_transfers {
        config.queue.max_concurrent_transfers = n;
    }
    if let Some(ms) = retry_backoff_ms {
        config.transport.retry_backoff_ms = ms;
    }
    if dry_run {
        config.transport.enabled = false;
    }

    let summary = facade::scan_and_transport(&config, auto_concurrency)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "processed {} file(s), {} failed, {} package(s) sealed",
            summary.processed_files,
            summary.failed_items.len(),
            summary.package_paths.len()
        );
        for failed in &summary.failed_items {
            println!("  FAILED {}: {}", failed.path.display(), failed.reason);
        }
        println!("log: {}", summary.log_file_path.display());
    }

    if !summary.success {
        std::process::exit(1);
    }
    Ok(())
}

/// Initialize tracing into `<output's parent>/logs/debug.log` (or, before
/// the config is even parsed, alongside the config file itself). `--debug`
/// raises the level from warn to debug.
fn init_tracing(config_path: &std::path::Path, debug: bool) {
    let logs_dir = config_path
        .parent()
        .map(|p| p.join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));
    let _ = std::fs::create_dir_all(&logs_dir);

    let log_path = logs_dir.join("debug.log");
    let level_str = if debug { "debug" } else { "warn" };

    match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => {
            let (non_blocking_writer, guard) = non_blocking(file);
            let _ = Box::leak(Box::new(guard));
            let file_layer = fmt::layer()
                .with_writer(non_blocking_writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new(level_str));
            tracing_subscriber::registry().with(file_layer).init();
        }
        Err(e) => {
            eprintln!("warning: could not open debug log at {}: {}", log_path.display(), e);
        }
    }
}
