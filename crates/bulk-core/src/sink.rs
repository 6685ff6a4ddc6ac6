//! The output capability shared by every batch consumer.

use std::sync::{Mutex, PoisonError};

use crate::error::SinkResult;

/// Something that accepts formatted batches.
///
/// A batch arrives as one newline-terminated string starting with
/// `"bulk: "`. Implementations must not block the caller beyond their own
/// buffering; slow outputs are wrapped in a worker-backed sink by the
/// daemon.
pub trait Sink: Send + Sync {
    /// Emits one formatted batch.
    fn accept(&self, batch: &str) -> SinkResult;

    /// Short label used in logs.
    fn name(&self) -> &str;
}

/// Sink that keeps every accepted batch in memory, in order.
///
/// Useful for embedders that post-process output and for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all batches accepted so far.
    pub fn batches(&self) -> Vec<String> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes and returns all batches accepted so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.batches.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Sink for MemorySink {
    fn accept(&self, batch: &str) -> SinkResult {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(batch.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
