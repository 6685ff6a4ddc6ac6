//! Line framing for byte chunks.
//!
//! Chunks may split a line anywhere; `LineBuffer` keeps the unterminated tail
//! until its newline arrives. The tail is bounded so a peer that never sends
//! a delimiter cannot grow it without limit.

use thiserror::Error;

/// Longest unterminated line accepted before a delimiter is required.
pub const MAX_LINE_LENGTH: usize = 1024;

const DELIMITER: u8 = b'\n';

/// Errors produced while framing lines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("Line too long: {size} bytes without delimiter (max: {max})")]
    TooLong { size: usize, max: usize },
}

/// Lines completed by one chunk, plus any overflow it caused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Framed {
    /// Complete lines, in order
    pub lines: Vec<String>,

    /// Set when the unterminated tail outgrew the bound and was dropped
    pub overflow: Option<LineError>,
}

/// Accumulates byte chunks and splits them into lines.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    buffer: Vec<u8>,
    max_length: usize,

    /// Skipping the rest of an oversized line until its delimiter
    discarding: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_length,
            discarding: false,
        }
    }

    /// Appends a chunk and returns every line it completes.
    ///
    /// Lines are returned without the `\n` (and without a trailing `\r`).
    /// Invalid UTF-8 is replaced lossily. If the unterminated tail grows past
    /// the bound, it is dropped, `overflow` is set, and the bytes up to and
    /// including the next delimiter are skipped as part of the same line.
    pub fn push(&mut self, mut chunk: &[u8]) -> Framed {
        let mut framed = Framed::default();

        if self.discarding {
            match chunk.iter().position(|&b| b == DELIMITER) {
                Some(pos) => {
                    self.discarding = false;
                    chunk = chunk.get(pos + 1..).unwrap_or_default();
                }
                None => return framed,
            }
        }

        self.buffer.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self
            .buffer
            .get(start..)
            .and_then(|rest| rest.iter().position(|&b| b == DELIMITER))
        {
            let end = start + offset;
            if let Some(raw) = self.buffer.get(start..end) {
                framed.lines.push(decode(raw));
            }
            start = end + 1;
        }
        self.buffer.drain(..start);

        if self.buffer.len() > self.max_length {
            framed.overflow = Some(LineError::TooLong {
                size: self.buffer.len(),
                max: self.max_length,
            });
            self.buffer.clear();
            self.discarding = true;
        }

        framed
    }

    /// Takes the unterminated tail, if any.
    ///
    /// The tail of an oversized line is never returned.
    pub fn take_remainder(&mut self) -> Option<String> {
        if std::mem::take(&mut self.discarding) || self.buffer.is_empty() {
            self.buffer.clear();
            return None;
        }
        let raw = std::mem::take(&mut self.buffer);
        Some(decode(&raw))
    }

    /// Bytes currently waiting for a delimiter.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the rest of an oversized line is being skipped.
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }
}

fn decode(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
