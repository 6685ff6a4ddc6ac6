//! Line grammar for the command stream.
//!
//! ```text
//! {        open a block (defers flushing until the matching close)
//! }        close a block
//! =<int>   set the batch-size threshold to |int|
//! other    literal command appended to the pending batch
//! ```

/// Line that opens a block.
pub const BLOCK_OPEN: &str = "{";

/// Line that closes a block.
pub const BLOCK_CLOSE: &str = "}";

/// Prefix of a threshold resize line.
pub const RESIZE_MARKER: char = '=';

/// A classified input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    OpenBlock,
    CloseBlock,
    /// New threshold, already made non-negative.
    Resize(usize),
    Push(&'a str),
}

impl<'a> Command<'a> {
    /// Classifies a single line (no trailing newline).
    ///
    /// Markers must match exactly; `" {"` is a literal command.
    pub fn parse(line: &'a str) -> Self {
        if line == BLOCK_OPEN {
            Command::OpenBlock
        } else if line == BLOCK_CLOSE {
            Command::CloseBlock
        } else if let Some(rest) = line.strip_prefix(RESIZE_MARKER) {
            Command::Resize(parse_threshold(rest))
        } else {
            Command::Push(line)
        }
    }
}

/// Parses the remainder of a resize line.
///
/// Takes the absolute value of the integer. Anything that is not a whole
/// integer (empty, `abc`, `12abc`) yields `0`, which disables count-based
/// flushing. Unlike C `atoi`, a numeric prefix is not enough: `12abc` is
/// rejected rather than read as 12.
pub fn parse_threshold(rest: &str) -> usize {
    match rest.trim().parse::<i64>() {
        Ok(n) => usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX),
        Err(_) => 0,
    }
}
