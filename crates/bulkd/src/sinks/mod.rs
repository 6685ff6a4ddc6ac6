//! Output sinks for completed batches.
//!
//! ```text
//!                  ┌──────────────────┐
//!   Processor ───▶ │  CompositeSink   │
//!                  └───┬─────────┬────┴───────────────┐
//!                      ▼         ▼                    ▼
//!              ThreadedSink  ThreadedSink    ConnectionRegistry
//!               (file, 2)    (console, 1)     (TCP broadcast)
//!                  │             │
//!                  ▼             ▼
//!              FileSink     ConsoleSink
//! ```
//!
//! Ownership is strictly parent to child; the tree has no cycles.

mod composite;
mod console;
mod file;
mod threaded;

pub use composite::CompositeSink;
pub use console::ConsoleSink;
pub use file::FileSink;
pub use threaded::ThreadedSink;

use std::sync::Arc;

use tracing::info;

use bulk_core::Sink;

use crate::config::OutputConfig;

/// The standard output tree and the worker pools behind it.
///
/// Keep this alive for as long as batches may be produced, then call
/// [`Outputs::shutdown`] once so queued batches reach disk and stdout.
pub struct Outputs {
    root: Arc<CompositeSink>,
    pools: Vec<Arc<ThreadedSink>>,
}

impl Outputs {
    /// Builds the tree described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be spawned.
    pub fn from_config(config: &OutputConfig) -> std::io::Result<Self> {
        let root = Arc::new(CompositeSink::new());
        let mut pools = Vec::new();

        if config.files {
            let file = Arc::new(FileSink::new(config.dir.clone()));
            let pool = Arc::new(ThreadedSink::spawn("file", file, config.file_workers)?);
            root.add(pool.clone());
            pools.push(pool);
        }

        if config.console {
            let pool = Arc::new(ThreadedSink::spawn("console", Arc::new(ConsoleSink::new()), 1)?);
            root.add(pool.clone());
            pools.push(pool);
        }

        info!(
            files = config.files,
            console = config.console,
            dir = %config.dir.display(),
            "Output sinks ready"
        );

        Ok(Self { root, pools })
    }

    /// Outputs with no children; callers attach their own sinks.
    pub fn empty() -> Self {
        Self {
            root: Arc::new(CompositeSink::new()),
            pools: Vec::new(),
        }
    }

    /// The composite every processor should write to.
    pub fn sink(&self) -> Arc<dyn Sink> {
        self.root.clone()
    }

    /// Attaches an extra child (for example the connection registry).
    pub fn attach(&self, child: Arc<dyn Sink>) {
        self.root.add(child);
    }

    /// Detaches a child previously attached. Returns `false` if unknown.
    pub fn detach(&self, child: &Arc<dyn Sink>) -> bool {
        self.root.remove(child)
    }

    /// Drains and stops every worker pool.
    pub async fn shutdown(&self) {
        for pool in &self.pools {
            pool.shutdown().await;
        }
        info!("Output sinks drained");
    }
}
