//! Fan-out sink.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

use bulk_core::{Sink, SinkResult};

/// Forwards every batch to a set of child sinks, in registration order.
///
/// Children can be added and removed while batches are being delivered.
/// Delivery iterates over a snapshot, so the lock is never held while a
/// child runs.
#[derive(Default)]
pub struct CompositeSink {
    children: RwLock<Vec<Arc<dyn Sink>>>,
}

impl CompositeSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a child. Adding the same sink twice delivers twice.
    pub fn add(&self, child: Arc<dyn Sink>) {
        self.children
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(child);
    }

    /// Removes a child by identity. Returns `false` if it was not registered.
    pub fn remove(&self, child: &Arc<dyn Sink>) -> bool {
        let mut children = self.children.write().unwrap_or_else(PoisonError::into_inner);
        match children.iter().position(|c| Arc::ptr_eq(c, child)) {
            Some(index) => {
                children.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn Sink>> {
        self.children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Sink for CompositeSink {
    /// Delivers to every child. A failing child is logged and skipped;
    /// this never returns an error.
    fn accept(&self, batch: &str) -> SinkResult {
        for child in self.snapshot() {
            if let Err(e) = child.accept(batch) {
                warn!(sink = child.name(), error = %e, "Sink delivery failed");
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "composite"
    }
}
