//! Bulk daemon - TCP broadcast server
//!
//! Every connected client gets its own batching pipeline; every completed
//! batch is written to the console, to a new file, and to every connected
//! client.
//!
//! # Usage
//!
//! ```bash
//! # Listen on port 9000 with a batch size of 3
//! bulkd --port 9000 --size 3
//!
//! # Use a config file, write batch files to /var/lib/bulk
//! bulkd --config bulkd.toml --output-dir /var/lib/bulk
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bulk_protocol::ServiceInfo;
use bulkd::config::Config;
use bulkd::registry::ConnectionRegistry;
use bulkd::server::BulkServer;
use bulkd::sinks::Outputs;

/// bulkd - command batcher with TCP broadcast
#[derive(Parser, Debug)]
#[command(name = "bulkd", version, about)]
struct Args {
    /// TOML config file (defaults to $BULKD_CONFIG if set)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Commands per batch; 0 disables size-based flushing
    #[arg(short, long)]
    size: Option<usize>,

    /// Directory batch files are written to
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    /// Applies command-line overrides on top of the loaded config.
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(size) = self.size {
            config.bulk.size = size;
        }
        if let Some(dir) = &self.output_dir {
            config.output.dir = dir.clone();
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.debug)?;

    let mut config = Config::load(args.config.as_deref()).context("Failed to load config")?;
    args.apply(&mut config);

    run_daemon(config)
}

fn init_tracing(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("bulkd={level}").parse()?)
                .add_directive(format!("bulk_core={level}").parse()?)
                .add_directive(format!("bulk_protocol={level}").parse()?),
        )
        .init();
    Ok(())
}

#[tokio::main]
async fn run_daemon(config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "Bulk daemon starting"
    );

    let addr = config.server.listen_addr()?;
    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let outputs = Outputs::from_config(&config.output).context("Failed to start output sinks")?;
    let registry = Arc::new(ConnectionRegistry::new(ServiceInfo::current()));
    outputs.attach(registry.clone());

    let server = BulkServer::bind(
        addr,
        config.bulk.size,
        registry,
        outputs.sink(),
        cancel_token,
    )
    .await?;

    let result = server.run().await;
    outputs.shutdown().await;

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Bulk daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
