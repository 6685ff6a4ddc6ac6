//! bulk - batch commands read from stdin
//!
//! Reads one command per line until EOF and writes every completed batch to
//! stdout and to a new `bulk<secs>_<worker>.log` file.
//!
//! # Usage
//!
//! ```bash
//! printf 'cmd1\ncmd2\ncmd3\n' | bulk 3
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bulk_core::Processor;
use bulkd::config::OutputConfig;
use bulkd::sinks::Outputs;
use bulkd::stream::run_stream;

/// bulk - regroup stdin commands into batches
#[derive(Parser, Debug)]
#[command(name = "bulk", version, about)]
struct Args {
    /// Commands per batch
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    size: u64,

    /// Directory batch files are written to
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("bulkd={level}").parse()?)
                .add_directive(format!("bulk_core={level}").parse()?),
        )
        .init();

    run(args)
}

#[tokio::main]
async fn run(args: Args) -> Result<()> {
    let threshold = usize::try_from(args.size).context("Block size too large")?;
    let outputs = Outputs::from_config(&OutputConfig {
        dir: args.output_dir,
        ..OutputConfig::default()
    })
    .context("Failed to start output sinks")?;

    let processor = Processor::new(threshold, outputs.sink());
    let result = run_stream(tokio::io::stdin(), processor).await;

    outputs.shutdown().await;
    let lines = result.context("Failed to read stdin")?;

    info!(lines, "Input processed");
    Ok(())
}
