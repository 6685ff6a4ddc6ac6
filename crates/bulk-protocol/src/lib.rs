//! bulk protocol - framing and service messages
//!
//! This crate provides the pieces of the line protocol shared by the TCP
//! server and the in-process multiplexer: splitting byte chunks into lines,
//! and the welcome/farewell text sent to network clients.

pub mod line;
pub mod message;

pub use line::{Framed, LineBuffer, LineError, MAX_LINE_LENGTH};
pub use message::{ServerMessage, ServiceInfo};
