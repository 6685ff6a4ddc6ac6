//! In-process multiplexer for many logical clients without sockets.
//!
//! Embedders that receive command data in arbitrary chunks (a message
//! queue, an FFI boundary) create one `Multiplexer` at startup, pass it
//! around by reference, and drop it at shutdown. Each `connect` creates an
//! independent processor addressed by an integer handle; all processors
//! share one sink.
//!
//! Unknown handles are reported as `false`, never as a panic.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, error};

use bulk_core::{Processor, Sink};
use bulk_protocol::LineBuffer;

/// Handle identifying one logical client of a [`Multiplexer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MuxHandle(u64);

impl MuxHandle {
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MuxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mux-{}", self.0)
    }
}

struct MuxClient {
    processor: Processor,
    buffer: LineBuffer,
}

impl MuxClient {
    fn feed(&mut self, lines: Vec<String>) {
        for line in lines {
            self.processor.push(&line);
        }
    }
}

/// Registry of logical clients, each with its own processor.
pub struct Multiplexer {
    clients: RwLock<BTreeMap<MuxHandle, Arc<Mutex<MuxClient>>>>,
    sink: Arc<dyn Sink>,
    next_handle: AtomicU64,
}

impl Multiplexer {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            clients: RwLock::new(BTreeMap::new()),
            sink,
            next_handle: AtomicU64::new(0),
        }
    }

    /// Creates a client with its own processor. Handles are never reused.
    pub fn connect(&self, threshold: usize) -> MuxHandle {
        let handle = MuxHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let client = MuxClient {
            processor: Processor::new(threshold, Arc::clone(&self.sink)),
            buffer: LineBuffer::new(),
        };

        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, Arc::new(Mutex::new(client)));

        debug!(handle = %handle, threshold, "Client connected");
        handle
    }

    /// Feeds a chunk of bytes to a client.
    ///
    /// Complete lines go to the client's processor; a trailing partial line
    /// waits for the next chunk. Returns `false` for an unknown handle, or
    /// when the partial line grew too long. The oversized line is skipped
    /// through its delimiter; lines completed before it are still processed.
    pub fn receive(&self, handle: MuxHandle, data: &[u8]) -> bool {
        let Some(client) = self.client(handle) else {
            error!(handle = %handle, "Receive for unknown handle");
            return false;
        };

        let mut client = client.lock().unwrap_or_else(PoisonError::into_inner);
        let framed = client.buffer.push(data);
        client.feed(framed.lines);

        match framed.overflow {
            Some(e) => {
                error!(handle = %handle, error = %e, "Dropping oversized line");
                false
            }
            None => true,
        }
    }

    /// Removes a client, flushing its pending batch unless a block is open.
    ///
    /// An unterminated trailing line is processed first. Returns `false`
    /// for an unknown handle.
    pub fn disconnect(&self, handle: MuxHandle) -> bool {
        let removed = self
            .clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);

        let Some(client) = removed else {
            error!(handle = %handle, "Disconnect for unknown handle");
            return false;
        };

        let mut client = client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tail) = client.buffer.take_remainder() {
            client.processor.push(&tail);
        }
        client.processor.finish();

        debug!(handle = %handle, "Client disconnected");
        true
    }

    pub fn contains(&self, handle: MuxHandle) -> bool {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn client(&self, handle: MuxHandle) -> Option<Arc<Mutex<MuxClient>>> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulk_core::MemorySink;

    fn mux() -> (Multiplexer, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (Multiplexer::new(sink.clone()), sink)
    }

    #[test]
    fn test_handles_are_distinct() {
        let (mux, _sink) = mux();
        let a = mux.connect(3);
        let b = mux.connect(3);

        assert_ne!(a, b);
        assert_eq!(mux.len(), 2);
    }

    #[test]
    fn test_chunked_input_is_reassembled() {
        let (mux, sink) = mux();
        let h = mux.connect(2);

        assert!(mux.receive(h, b"cm"));
        assert!(mux.receive(h, b"d1\ncm"));
        assert!(sink.is_empty());
        assert!(mux.receive(h, b"d2\n"));

        assert_eq!(sink.batches(), vec!["bulk: cmd1 cmd2\n"]);
    }

    #[test]
    fn test_clients_are_independent() {
        let (mux, sink) = mux();
        let a = mux.connect(2);
        let b = mux.connect(2);

        mux.receive(a, b"a1\n");
        mux.receive(b, b"b1\n");
        assert!(sink.is_empty());

        mux.receive(a, b"a2\n");
        assert_eq!(sink.batches(), vec!["bulk: a1 a2\n"]);
    }

    #[test]
    fn test_disconnect_flushes_pending() {
        let (mux, sink) = mux();
        let h = mux.connect(5);
        mux.receive(h, b"a\nb\n");

        assert!(mux.disconnect(h));
        assert_eq!(sink.batches(), vec!["bulk: a b\n"]);
        assert!(mux.is_empty());
    }

    #[test]
    fn test_disconnect_feeds_trailing_partial_line() {
        let (mux, sink) = mux();
        let h = mux.connect(5);
        mux.receive(h, b"a\nb");

        mux.disconnect(h);
        assert_eq!(sink.batches(), vec!["bulk: a b\n"]);
    }

    #[test]
    fn test_disconnect_inside_block_discards() {
        let (mux, sink) = mux();
        let h = mux.connect(5);
        mux.receive(h, b"{\na\n");

        mux.disconnect(h);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_unknown_handle_reports_false() {
        let (mux, _sink) = mux();
        let h = mux.connect(3);
        assert!(mux.disconnect(h));

        assert!(!mux.receive(h, b"a\n"));
        assert!(!mux.disconnect(h));
        assert!(!mux.contains(h));
    }

    #[test]
    fn test_oversized_partial_line_reports_false() {
        let (mux, sink) = mux();
        let h = mux.connect(1);
        let long = vec![b'x'; bulk_protocol::MAX_LINE_LENGTH + 1];

        assert!(!mux.receive(h, &long));
        // The rest of the oversized line is skipped up to its newline.
        assert!(mux.receive(h, b"xxx\nok\n"));
        assert_eq!(sink.batches(), vec!["bulk: ok\n"]);
    }

    #[test]
    fn test_lines_before_oversized_tail_are_kept() {
        let (mux, sink) = mux();
        let h = mux.connect(2);

        let mut chunk = b"a\nb\n".to_vec();
        chunk.extend(std::iter::repeat(b'x').take(2000));

        assert!(!mux.receive(h, &chunk));
        assert_eq!(sink.batches(), vec!["bulk: a b\n"]);

        // Nothing of the oversized line survives a disconnect.
        assert!(mux.disconnect(h));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_concurrent_clients() {
        let (mux, sink) = mux();
        let mux = Arc::new(mux);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let mux = Arc::clone(&mux);
                std::thread::spawn(move || {
                    let h = mux.connect(1);
                    for _ in 0..25 {
                        assert!(mux.receive(h, b"x\n"));
                    }
                    mux.disconnect(h);
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        assert_eq!(sink.len(), 100);
        assert!(mux.is_empty());
    }
}
