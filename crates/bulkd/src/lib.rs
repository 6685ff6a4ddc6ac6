//! Bulk daemon - output sinks, connection registry and broadcast server
//!
//! This crate provides the runtime around the `bulk-core` processor:
//! - `config` - TOML configuration for the daemon
//! - `sinks` - Console, file, fan-out and worker-pool sinks
//! - `registry` - Connected clients, also the broadcast sink
//! - `server` - TCP server, one processor per connection
//! - `multiplexer` - Handle-addressed processors for embedders
//! - `stream` - Runner for a single input stream such as stdin
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        bulkd daemon                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐          ┌─────────────────────────┐   │
//! │  │   BulkServer    │          │     CompositeSink       │   │
//! │  │  (TcpListener)  │          │   (Outputs root sink)   │   │
//! │  └────────┬────────┘          └──┬─────────┬─────────┬──┘   │
//! │           │ connections          │         │         │      │
//! │           ▼                      ▼         ▼         ▼      │
//! │  ┌─────────────────┐  batches  console   files   registry  │
//! │  │ConnectionHandler│───────────▶ (pool)   (pool)     │      │
//! │  │  + Processor    │◀───────────────────────────────┘      │
//! │  └─────────────────┘      broadcast to every client        │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! Production code in this crate:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod multiplexer;
pub mod registry;
pub mod server;
pub mod sinks;
pub mod stream;
