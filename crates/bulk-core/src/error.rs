//! Sink error types following panic-free policy.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors a sink can report when it fails to emit a batch.
///
/// A failing sink never aborts the producing session: callers log the
/// error and move on to the next sink.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Creating or writing a batch file failed
    #[error("{sink}: failed to write {path}: {source}")]
    Io {
        sink: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing to a stream (stdout, socket queue) failed
    #[error("{sink}: write failed: {source}")]
    Write {
        sink: String,
        #[source]
        source: io::Error,
    },

    /// The sink was shut down and no longer accepts batches
    #[error("{sink}: sink is closed")]
    Closed { sink: String },
}

impl SinkError {
    /// Shorthand for a [`SinkError::Closed`] error.
    pub fn closed(sink: impl Into<String>) -> Self {
        Self::Closed { sink: sink.into() }
    }
}

/// Result type for sink operations.
pub type SinkResult<T = ()> = Result<T, SinkError>;
