//! Per-connection duplex pipeline.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Joins the connection registry (welcome message)
//! - Runs an inbound loop splitting the byte stream into lines and feeding
//!   the session's own `Processor`
//! - Runs an outbound task draining the connection's private queue
//! - Leaves the registry exactly once when either side fails or ends
//!
//! # Lifecycle
//!
//! ```text
//! Open ──(EOF / I/O error / write failure / shutdown)──▶ Closing ──(outbound done)──▶ Closed
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and result in graceful disconnect

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep, timeout, Instant};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bulk_core::{Processor, Sink};
use bulk_protocol::MAX_LINE_LENGTH;

use crate::registry::{outbound_queue, ClientHandle, ClientId, ConnectionRegistry, OutboundReceiver};

/// Write timeout for a single outbound item (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a session with an open block may keep reading after shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

/// State shared by a connection's inbound and outbound halves.
pub struct Connection {
    id: ClientId,
    registry: Arc<ConnectionRegistry>,
    state: Mutex<ConnectionState>,

    /// Cancelled when the connection starts closing; wakes the outbound task
    closing: CancellationToken,
}

impl Connection {
    pub fn new(id: ClientId, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            id,
            registry,
            state: Mutex::new(ConnectionState::Open),
            closing: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Token cancelled once closing has begun.
    pub fn closing(&self) -> &CancellationToken {
        &self.closing
    }

    /// Starts the close sequence: leave the registry (farewell), then wake
    /// the outbound task.
    ///
    /// Only the first call does anything and returns `true`.
    pub fn close(&self) -> bool {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != ConnectionState::Open {
                return false;
            }
            *state = ConnectionState::Closing;
        }

        self.registry.leave(self.id);
        self.closing.cancel();
        debug!(client_id = %self.id, "Connection closing");
        true
    }

    fn mark_closed(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = ConnectionState::Closed;
    }
}

/// Connection handler for a single client.
pub struct ConnectionHandler {
    connection: Arc<Connection>,

    /// Where this session's batches go
    sink: Arc<dyn Sink>,

    /// Initial threshold for this session's processor
    threshold: usize,

    /// Process-wide shutdown
    shutdown: CancellationToken,
}

impl ConnectionHandler {
    /// Creates a handler with a freshly allocated client id.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        sink: Arc<dyn Sink>,
        threshold: usize,
        shutdown: CancellationToken,
    ) -> Self {
        let id = registry.next_client_id();
        Self {
            connection: Arc::new(Connection::new(id, registry)),
            sink,
            threshold,
            shutdown,
        }
    }

    pub fn id(&self) -> ClientId {
        self.connection.id()
    }

    /// Shared connection state, for observing or closing from outside.
    pub fn connection(&self) -> Arc<Connection> {
        Arc::clone(&self.connection)
    }

    /// Runs the connection until it is closed.
    ///
    /// Returns the client id once both halves have finished.
    pub async fn run<S>(self, stream: S) -> ClientId
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let id = self.connection.id();
        let (reader, writer) = tokio::io::split(stream);
        let (tx, rx) = outbound_queue();

        if !self.connection.registry.join(ClientHandle::new(id, tx)) {
            warn!(client_id = %id, "Client id already registered");
        }

        let outbound = tokio::spawn(outbound_loop(writer, rx, Arc::clone(&self.connection)));

        match self.inbound(reader).await {
            Ok(()) => debug!(client_id = %id, "Inbound finished"),
            Err(e) => debug!(client_id = %id, error = %e, "Inbound closed with error"),
        }

        self.connection.close();
        if let Err(e) = outbound.await {
            warn!(client_id = %id, error = %e, "Outbound task failed");
        }
        self.connection.mark_closed();

        info!(client_id = %id, "Client disconnected");
        id
    }

    /// Reads lines until EOF, an error, closing or shutdown.
    ///
    /// The processor lives only inside this loop; dropping it flushes a
    /// pending batch when no block is open.
    ///
    /// Shutdown stops the loop at once when no block is open. Inside a block
    /// the session keeps reading until the block closes, EOF, or
    /// `SHUTDOWN_GRACE` elapses, whichever comes first.
    async fn inbound<R>(&self, reader: R) -> Result<(), ConnectionError>
    where
        R: AsyncRead + Unpin,
    {
        let id = self.connection.id();
        let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        let mut processor = Processor::new(self.threshold, Arc::clone(&self.sink));

        let mut draining = false;
        let grace = sleep(SHUTDOWN_GRACE);
        tokio::pin!(grace);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled(), if !draining => {
                    if processor.depth() == 0 {
                        debug!(client_id = %id, "Shutdown requested");
                        return Ok(());
                    }
                    debug!(
                        client_id = %id,
                        depth = processor.depth(),
                        "Shutdown requested inside a block, waiting for it to close"
                    );
                    draining = true;
                    grace.as_mut().reset(Instant::now() + SHUTDOWN_GRACE);
                }

                _ = &mut grace, if draining => {
                    warn!(
                        client_id = %id,
                        depth = processor.depth(),
                        "Block still open after shutdown grace period"
                    );
                    return Ok(());
                }

                _ = self.connection.closing().cancelled() => {
                    return Err(ConnectionError::Closed);
                }

                next = lines.next() => match next {
                    Some(Ok(line)) => {
                        debug!(client_id = %id, line = %line, "Received line");
                        processor.push(&line);
                        if draining && processor.depth() == 0 {
                            debug!(client_id = %id, "Block closed during shutdown");
                            return Ok(());
                        }
                    }
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        return Err(ConnectionError::LineTooLong { max: MAX_LINE_LENGTH });
                    }
                    Some(Err(LinesCodecError::Io(e))) => {
                        return Err(ConnectionError::Io(e.to_string()));
                    }
                    None => return Err(ConnectionError::Eof),
                },
            }
        }
    }
}

/// Drains the outbound queue into the socket, one item at a time.
///
/// After closing begins, items already queued (the farewell among them) are
/// still written best-effort before the write half is shut down.
async fn outbound_loop<W>(mut writer: W, mut rx: OutboundReceiver, connection: Arc<Connection>)
where
    W: AsyncWrite + Unpin,
{
    let id = connection.id();
    let closing = connection.closing().clone();

    loop {
        tokio::select! {
            biased;

            item = rx.recv() => match item {
                Some(text) => {
                    if let Err(e) = write_item(&mut writer, &text).await {
                        debug!(client_id = %id, error = %e, "Write failed");
                        connection.close();
                        return;
                    }
                }
                // The registry dropped its handle and the queue is empty.
                None => break,
            },

            _ = closing.cancelled() => break,
        }
    }

    while let Ok(text) = rx.try_recv() {
        if write_item(&mut writer, &text).await.is_err() {
            break;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!(client_id = %id, error = %e, "Failed to shut down write half");
    }
}

async fn write_item<W>(writer: &mut W, text: &str) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
{
    match timeout(WRITE_TIMEOUT, async {
        writer.write_all(text.as_bytes()).await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed by peer")]
    Eof,

    #[error("Connection closed locally")]
    Closed,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Line too long (max: {max} bytes)")]
    LineTooLong { max: usize },
}
