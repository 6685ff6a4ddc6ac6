//! Registry of connected network clients.
//!
//! The registry is the broadcast target for completed batches: it is
//! attached to the output composite like any other sink, and every batch it
//! accepts is queued on each member's outbound queue.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ join/leave ┌──────────────────────┐  send   ┌────────────────┐
//! │  Connection  │───────────▶│  ConnectionRegistry  │────────▶│ outbound queue │
//! │  (per peer)  │            │ RwLock<HashMap<..>>  │         │  (per peer)    │
//! └──────────────┘            └──────────▲───────────┘         └────────────────┘
//!                                        │ accept(batch)
//!                                 ┌──────┴───────┐
//!                                 │ CompositeSink│
//!                                 └──────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Poisoned locks are recovered, not propagated
//! - The lock is never held across an `.await`

mod client;

pub use client::{outbound_queue, ClientHandle, ClientId, OutboundReceiver, OutboundSender};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, info};

use bulk_core::{Sink, SinkResult};
use bulk_protocol::{ServerMessage, ServiceInfo};

/// Set of currently joined clients.
pub struct ConnectionRegistry {
    clients: RwLock<HashMap<ClientId, ClientHandle>>,
    service: ServiceInfo,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new(service: ServiceInfo) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            service,
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocates an id no other client of this registry has used.
    pub fn next_client_id(&self) -> ClientId {
        ClientId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn service(&self) -> &ServiceInfo {
        &self.service
    }

    /// Registers a client and sends it the welcome message.
    ///
    /// Returns `false` (and sends nothing) if the id is already registered.
    pub fn join(&self, client: ClientHandle) -> bool {
        let id = client.id();
        {
            let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
            if clients.contains_key(&id) {
                debug!(client_id = %id, "Client already joined");
                return false;
            }
            client.send(&ServerMessage::welcome(&self.service).render());
            clients.insert(id, client);
        }

        info!(client_id = %id, members = self.len(), "Client joined");
        true
    }

    /// Sends the farewell message and unregisters the client.
    ///
    /// Idempotent: returns `false` and sends nothing if the client is not
    /// registered (already left, or dropped by a failed broadcast).
    pub fn leave(&self, id: ClientId) -> bool {
        let removed = self
            .clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        match removed {
            Some(client) => {
                client.send(&ServerMessage::Farewell.render());
                info!(client_id = %id, members = self.len(), "Client left");
                true
            }
            None => {
                debug!(client_id = %id, "Leave for unknown client ignored");
                false
            }
        }
    }

    /// Queues `data` for every member.
    ///
    /// Members whose queue is closed are skipped and removed once delivery
    /// to everyone else is done. Returns the number of members reached.
    pub fn broadcast(&self, data: &str) -> usize {
        let mut delivered = 0;
        let mut failed = Vec::new();

        {
            let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
            for (id, client) in clients.iter() {
                if client.send(data) {
                    delivered += 1;
                } else {
                    failed.push(*id);
                }
            }
        }

        if !failed.is_empty() {
            let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
            for id in failed {
                if clients.remove(&id).is_some() {
                    debug!(client_id = %id, "Removed unreachable client");
                }
            }
        }

        delivered
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
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

    /// Ids of all members, sorted.
    pub fn members(&self) -> Vec<ClientId> {
        let mut ids: Vec<_> = self
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(ServiceInfo::current())
    }
}

impl Sink for ConnectionRegistry {
    fn accept(&self, batch: &str) -> SinkResult {
        let delivered = self.broadcast(batch);
        debug!(delivered, "Batch broadcast to clients");
        Ok(())
    }

    fn name(&self) -> &str {
        "clients"
    }
}
