//! Worker-backed sink.
//!
//! `ThreadedSink` decouples accepting a batch from emitting it: `accept`
//! only enqueues, and a fixed pool of OS threads drains the queue into the
//! inner sink. Disk and console writes therefore never run on the async
//! reactor.
//!
//! # Shutdown
//!
//! `shutdown()` is explicit and awaitable: it closes the queue, lets the
//! workers finish every batch already queued, and joins them. Dropping a
//! `ThreadedSink` without shutting it down closes the queue too, but nobody
//! waits for the workers.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use bulk_core::{Sink, SinkError, SinkResult};

type SharedReceiver = Arc<Mutex<mpsc::UnboundedReceiver<String>>>;

/// Sink that hands batches to worker threads.
pub struct ThreadedSink {
    label: String,

    /// `None` once shutdown has started
    sender: Mutex<Option<mpsc::UnboundedSender<String>>>,

    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadedSink {
    /// Spawns `workers` threads (at least one) named `<label>-<index>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to spawn a thread.
    pub fn spawn(
        label: impl Into<String>,
        inner: Arc<dyn Sink>,
        workers: usize,
    ) -> std::io::Result<Self> {
        let label = label.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let receiver: SharedReceiver = Arc::new(Mutex::new(rx));

        let mut handles = Vec::with_capacity(workers.max(1));
        for index in 0..workers.max(1) {
            let receiver = Arc::clone(&receiver);
            let inner = Arc::clone(&inner);
            let handle = thread::Builder::new()
                .name(format!("{label}-{index}"))
                .spawn(move || worker_loop(receiver, inner))?;
            handles.push(handle);
        }

        debug!(sink = %label, workers = handles.len(), "Threaded sink started");

        Ok(Self {
            label,
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
        })
    }

    /// Number of worker threads still owned by this sink.
    pub fn worker_count(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Stops accepting batches, drains the queue and joins the workers.
    ///
    /// Safe to call more than once; later calls return immediately.
    pub async fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // Dropping the last sender lets workers see the end of the queue
        // once it is empty.
        drop(sender);

        let handles = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if handles.is_empty() {
            return;
        }

        let label = self.label.clone();
        let joined = tokio::task::spawn_blocking(move || {
            for handle in handles {
                if handle.join().is_err() {
                    warn!(sink = %label, "Sink worker panicked");
                }
            }
        })
        .await;

        if let Err(e) = joined {
            warn!(sink = %self.label, error = %e, "Failed to join sink workers");
        }
        debug!(sink = %self.label, "Threaded sink stopped");
    }
}

impl Sink for ThreadedSink {
    fn accept(&self, batch: &str) -> SinkResult {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(tx) => tx
                .send(batch.to_string())
                .map_err(|_| SinkError::closed(self.label.as_str())),
            None => Err(SinkError::closed(self.label.as_str())),
        }
    }

    fn name(&self) -> &str {
        &self.label
    }
}

fn worker_loop(receiver: SharedReceiver, inner: Arc<dyn Sink>) {
    loop {
        // Only one worker waits on the queue at a time; the others wait on
        // the lock. The lock is released before the batch is emitted.
        let next = receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .blocking_recv();

        let Some(batch) = next else {
            break;
        };

        if let Err(e) = inner.accept(&batch) {
            warn!(sink = inner.name(), error = %e, "Sink worker failed to emit batch");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulk_core::MemorySink;
    use std::time::Duration;

    /// Inner sink slow enough that batches pile up in the queue.
    struct SlowSink {
        inner: MemorySink,
    }

    impl Sink for SlowSink {
        fn accept(&self, batch: &str) -> SinkResult {
            thread::sleep(Duration::from_millis(5));
            self.inner.accept(batch)
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let inner = Arc::new(MemorySink::new());
        let sink = ThreadedSink::spawn("test", inner.clone(), 2).unwrap();

        for i in 0..50 {
            sink.accept(&format!("bulk: {i}\n")).unwrap();
        }
        sink.shutdown().await;

        assert_eq!(inner.len(), 50);
        assert_eq!(sink.worker_count(), 0);
    }

    #[tokio::test]
    async fn test_accept_returns_before_slow_inner_sink() {
        let slow = Arc::new(SlowSink {
            inner: MemorySink::new(),
        });
        let sink = ThreadedSink::spawn("slow", slow.clone(), 1).unwrap();

        let start = std::time::Instant::now();
        for _ in 0..20 {
            sink.accept("bulk: x\n").unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(100));

        sink.shutdown().await;
        assert_eq!(slow.inner.len(), 20);
    }

    #[tokio::test]
    async fn test_single_worker_preserves_order() {
        let inner = Arc::new(MemorySink::new());
        let sink = ThreadedSink::spawn("ordered", inner.clone(), 1).unwrap();

        for i in 0..10 {
            sink.accept(&format!("bulk: {i}\n")).unwrap();
        }
        sink.shutdown().await;

        let expected: Vec<String> = (0..10).map(|i| format!("bulk: {i}\n")).collect();
        assert_eq!(inner.batches(), expected);
    }

    #[tokio::test]
    async fn test_accept_after_shutdown_is_rejected() {
        let inner = Arc::new(MemorySink::new());
        let sink = ThreadedSink::spawn("closed", inner.clone(), 1).unwrap();
        sink.shutdown().await;

        assert!(sink.is_closed());
        assert!(matches!(
            sink.accept("bulk: late\n"),
            Err(SinkError::Closed { .. })
        ));
        assert!(inner.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let sink = ThreadedSink::spawn("twice", Arc::new(MemorySink::new()), 2).unwrap();
        sink.shutdown().await;
        sink.shutdown().await;

        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn test_zero_workers_still_spawns_one() {
        let sink = ThreadedSink::spawn("min", Arc::new(MemorySink::new()), 0).unwrap();
        assert_eq!(sink.worker_count(), 1);
        sink.shutdown().await;
    }
}
