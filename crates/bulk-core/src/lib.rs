//! bulk core - batching state machine and sink capability
//!
//! This crate provides the transport-independent pieces shared by the
//! single-stream tool (`bulk`) and the daemon (`bulkd`):
//! - `command` - the line grammar (`{`, `}`, `=N`, plain commands)
//! - `batch` - pending commands and the `bulk: ...` wire format
//! - `processor` - the per-session state machine deciding when to flush
//! - `sink` - the capability every output implements
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod batch;
pub mod command;
pub mod error;
pub mod processor;
pub mod sink;

// Re-exports for convenience
pub use batch::{Batch, BatchAccumulator, BATCH_PREFIX};
pub use command::{parse_threshold, Command, BLOCK_CLOSE, BLOCK_OPEN, RESIZE_MARKER};
pub use error::{SinkError, SinkResult};
pub use processor::{Processor, DEFAULT_THRESHOLD};
pub use sink::{MemorySink, Sink};
