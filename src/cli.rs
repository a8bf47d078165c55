use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan, fingerprint, package and ship files described by a config file.
    Run {
        #[clap(short, long, help = "Path to the pipeline config JSON file")]
        config: PathBuf,

        #[clap(long, help = "Override rootDir from the config file")]
        root: Option<PathBuf>,

        #[clap(long, help = "Override outputDir from the config file")]
        output: Option<PathBuf>,

        #[clap(long, help = "Override queue.maxConcurrentFileChecks")]
        max_concurrent_checks: Option<usize>,

        #[clap(long, help = "Override queue.maxConcurrentTransfers")]
        max_concurrent_transfers: Option<usize>,

        #[clap(long, help = "Run the scan/package stages but skip transport entirely")]
        dry_run: bool,

        #[clap(long, help = "Print the run summary as JSON instead of human text")]
        json: bool,

        #[clap(long, help = "Raise tracing verbosity to debug")]
        debug: bool,

        #[clap(long, help = "Override the base backoff between transport retries, in ms")]
        retry_backoff_ms: Option<u64>,

        #[clap(
            long,
            conflicts_with_all = ["max_concurrent_checks", "max_concurrent_transfers"],
            help = "Size concurrency automatically from the number and size of matched files"
        )]
        auto_concurrency: bool,
    },
}
