//! TCP server for the bulk daemon.
//!
//! The server:
//! - Listens on a TCP port for client connections
//! - Spawns a ConnectionHandler for each client, each with its own processor
//! - Stops accepting on shutdown and waits for sessions to wind down
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │    BulkServer   │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐  batches  ┌─────────────────┐
//! │ConnectionHandler│──────────▶│  CompositeSink  │──▶ file / console
//! │   (per client)  │           └────────┬────────┘
//! └─────────────────┘                    │
//!         ▲                              ▼
//!         │ outbound queue     ┌────────────────────┐
//!         └────────────────────│ ConnectionRegistry │
//!                              └────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and allow continued operation

mod connection;

pub use connection::{Connection, ConnectionError, ConnectionHandler, ConnectionState};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use bulk_core::Sink;

use crate::registry::ConnectionRegistry;

/// TCP server accepting command streams.
pub struct BulkServer {
    listener: TcpListener,

    /// Initial threshold for every session
    threshold: usize,

    registry: Arc<ConnectionRegistry>,

    /// Root sink shared by every session's processor
    sink: Arc<dyn Sink>,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Running session tasks
    sessions: TaskTracker,

    /// Connections accepted so far
    accepted: AtomicU64,
}

impl BulkServer {
    /// Binds the listening socket.
    ///
    /// Port 0 picks a free port; see [`BulkServer::local_addr`].
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if the address cannot be bound. This is
    /// the only fatal error of the daemon.
    pub async fn bind(
        addr: SocketAddr,
        threshold: usize,
        registry: Arc<ConnectionRegistry>,
        sink: Arc<dyn Sink>,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr,
                error: e.to_string(),
            })?;

        Ok(Self {
            listener,
            threshold,
            registry,
            sink,
            cancel_token,
            sessions: TaskTracker::new(),
            accepted: AtomicU64::new(0),
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(|e| ServerError::Io(e.to_string()))
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered, then
    /// waits for every session to finish. Sessions observe the same token
    /// and close at their next line boundary.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(
            addr = %self.local_addr()?,
            threshold = self.threshold,
            "Bulk server listening"
        );

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => self.handle_connection(stream, peer),
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        let BulkServer {
            listener, sessions, ..
        } = self;
        drop(listener);

        sessions.close();
        debug!(sessions = sessions.len(), "Waiting for sessions to finish");
        sessions.wait().await;

        info!("Server stopped");
        Ok(())
    }

    /// Spawns a session for a freshly accepted connection.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let hits = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let handler = ConnectionHandler::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.sink),
            self.threshold,
            self.cancel_token.clone(),
        );
        info!(client_id = %handler.id(), peer = %peer, hits, "New client connected");

        self.sessions.spawn(handler.run(stream));
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("I/O error: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:9000".parse().unwrap(),
            error: "address in use".to_string(),
        };
        assert!(err.to_string().contains("127.0.0.1:9000"));
        assert!(err.to_string().contains("address in use"));
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let registry = Arc::new(ConnectionRegistry::default());
        let first = BulkServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            3,
            Arc::clone(&registry),
            registry.clone(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let taken = first.local_addr().unwrap();

        let second = BulkServer::bind(
            taken,
            3,
            Arc::clone(&registry),
            registry.clone(),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(second, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_run_returns_after_cancel() {
        let registry = Arc::new(ConnectionRegistry::default());
        let token = CancellationToken::new();
        let server = BulkServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            3,
            Arc::clone(&registry),
            registry.clone(),
            token.clone(),
        )
        .await
        .unwrap();

        let task = tokio::spawn(server.run());
        token.cancel();

        let result = tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
