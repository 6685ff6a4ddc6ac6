//! Client identity and the registry's view of a connection.

use std::fmt;

use tokio::sync::mpsc;

/// Unique identifier for a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Sending half of a connection's outbound queue.
pub type OutboundSender = mpsc::UnboundedSender<String>;

/// Receiving half of a connection's outbound queue.
pub type OutboundReceiver = mpsc::UnboundedReceiver<String>;

/// Creates an outbound queue for one connection.
pub fn outbound_queue() -> (OutboundSender, OutboundReceiver) {
    mpsc::unbounded_channel()
}

/// What the registry holds for each member.
///
/// Only the queue's sending half is kept: the socket is owned by the
/// connection's tasks, and dropping this handle never closes it.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    outbound: OutboundSender,
}

impl ClientHandle {
    pub fn new(id: ClientId, outbound: OutboundSender) -> Self {
        Self { id, outbound }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Queues text for the client.
    ///
    /// Returns `false` if the connection has stopped reading its queue.
    pub fn send(&self, text: &str) -> bool {
        self.outbound.send(text.to_string()).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}
