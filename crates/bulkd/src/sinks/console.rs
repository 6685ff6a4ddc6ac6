//! Standard output sink.

use std::io::{self, Write};

use bulk_core::{Sink, SinkError, SinkResult};

/// Writes each batch to stdout and flushes it.
///
/// The stdout lock is held for the whole batch, so concurrent writers never
/// interleave within a batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl Sink for ConsoleSink {
    fn accept(&self, batch: &str) -> SinkResult {
        let mut out = io::stdout().lock();
        out.write_all(batch.as_bytes())
            .and_then(|()| out.flush())
            .map_err(|source| SinkError::Write {
                sink: self.name().to_string(),
                source,
            })
    }

    fn name(&self) -> &str {
        "console"
    }
}
