//! Pending commands and the batch wire format.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::sink::Sink;

/// Marker every rendered batch starts with.
pub const BATCH_PREFIX: &str = "bulk:";

/// An ordered group of commands captured between two flush points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    commands: Vec<String>,
}

impl Batch {
    pub fn new(commands: Vec<String>) -> Self {
        Self { commands }
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Renders `"bulk: cmd1 cmd2 ...\n"`.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(BATCH_PREFIX)?;
        for command in &self.commands {
            write!(f, " {command}")?;
        }
        f.write_str("\n")
    }
}

/// Collects commands for one session and hands completed batches to a sink.
///
/// This is the only place batches are produced, so it is also where
/// "never emit an empty batch" is enforced.
pub struct BatchAccumulator {
    pending: Vec<String>,
    sink: Arc<dyn Sink>,
}

impl BatchAccumulator {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            pending: Vec::new(),
            sink,
        }
    }

    /// Appends a command. Empty commands are ignored.
    pub fn add(&mut self, command: &str) {
        if command.is_empty() {
            return;
        }
        self.pending.push(command.to_string());
    }

    /// Emits the pending commands as one batch and clears them.
    ///
    /// Returns `false` without touching the sink when nothing is pending.
    /// A sink failure is logged; the batch counts as consumed either way.
    pub fn flush(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }

        let batch = Batch::new(std::mem::take(&mut self.pending));
        let rendered = batch.render();
        debug!(commands = batch.len(), sink = self.sink.name(), "Flushing batch");

        if let Err(e) = self.sink.accept(&rendered) {
            warn!(sink = self.sink.name(), error = %e, "Sink rejected batch");
        }
        true
    }

    /// Drops pending commands without emitting them.
    ///
    /// Returns how many commands were dropped.
    pub fn discard(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Commands waiting for the next flush.
    pub fn pending(&self) -> &[String] {
        &self.pending
    }
}
