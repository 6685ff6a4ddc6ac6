//! Per-session batching state machine.
//!
//! A `Processor` decides, line by line, whether to append a command, open or
//! close a block, change the threshold, or flush. Exactly one task feeds a
//! given processor; it is never shared.
//!
//! # Flush points
//!
//! A flush only happens while no block is open:
//! - `{` at depth 0 flushes what is pending before the block starts
//! - `}` returning to depth 0 flushes the block's contents
//! - the line counter reaching a non-zero threshold outside a block
//! - shutdown at depth 0
//!
//! An unterminated block is discarded on shutdown. A `}` with no open block
//! is ignored: depth never goes below zero.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::batch::BatchAccumulator;
use crate::command::Command;
use crate::sink::Sink;

/// Threshold used when none is configured.
pub const DEFAULT_THRESHOLD: usize = 3;

/// Batching state machine for one command stream.
pub struct Processor {
    /// Lines per automatic flush; 0 disables count-based flushing
    threshold: usize,

    /// Number of currently open blocks
    depth: usize,

    /// Lines seen since the last reset
    counter: usize,

    accumulator: BatchAccumulator,

    finished: bool,
}

impl Processor {
    /// Creates a processor emitting batches to `sink`.
    pub fn new(threshold: usize, sink: Arc<dyn Sink>) -> Self {
        info!(threshold, "Bulk processor created");
        Self {
            threshold,
            depth: 0,
            counter: 0,
            accumulator: BatchAccumulator::new(sink),
            finished: false,
        }
    }

    /// Feeds one line (without its newline). Empty lines are ignored.
    pub fn push(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }

        self.counter += 1;

        match Command::parse(line) {
            Command::OpenBlock => {
                self.counter = 0;
                if self.depth == 0 {
                    self.accumulator.flush();
                }
                self.depth += 1;
            }
            Command::CloseBlock => {
                self.counter = 0;
                if self.depth == 0 {
                    warn!("Ignoring unmatched block close");
                } else {
                    self.depth -= 1;
                    if self.depth == 0 {
                        self.accumulator.flush();
                    }
                }
            }
            Command::Resize(threshold) => {
                self.counter = 0;
                if threshold == 0 {
                    warn!(line, "Threshold set to 0, count-based flushing disabled");
                } else {
                    debug!(threshold, "Threshold changed");
                }
                self.threshold = threshold;
            }
            Command::Push(command) => {
                self.accumulator.add(command);
            }
        }

        if self.depth == 0 && self.threshold > 0 && self.counter == self.threshold {
            self.accumulator.flush();
            self.counter = 0;
        }
    }

    /// Feeds every line in order.
    pub fn push_all<'a, I>(&mut self, lines: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for line in lines {
            self.push(line);
        }
    }

    /// Ends the stream: flushes pending commands at depth 0, discards an
    /// unterminated block otherwise.
    ///
    /// Runs at most once; `Drop` calls it if the owner did not.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        if self.depth == 0 {
            self.accumulator.flush();
        } else {
            let dropped = self.accumulator.discard();
            debug!(depth = self.depth, dropped, "Discarding unterminated block");
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    /// Commands waiting for the next flush.
    pub fn pending(&self) -> &[String] {
        self.accumulator.pending()
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    fn processor(threshold: usize) -> (Processor, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (Processor::new(threshold, sink.clone()), sink)
    }

    #[test]
    fn test_flush_at_threshold() {
        let (mut p, sink) = processor(3);
        p.push_all(["a", "b", "c"]);

        assert_eq!(sink.batches(), vec!["bulk: a b c\n"]);
        assert_eq!(p.counter(), 0);
    }

    #[test]
    fn test_flush_every_threshold_lines() {
        let (mut p, sink) = processor(2);
        p.push_all(["a", "b", "c", "d", "e"]);

        assert_eq!(sink.batches(), vec!["bulk: a b\n", "bulk: c d\n"]);
        assert_eq!(p.pending(), ["e"]);
    }

    #[test]
    fn test_block_flushes_pending_then_contents() {
        let (mut p, sink) = processor(3);
        p.push_all(["a", "{", "b", "c", "}", "d"]);

        assert_eq!(sink.batches(), vec!["bulk: a\n", "bulk: b c\n"]);
        assert_eq!(p.pending(), ["d"]);
        assert_eq!(p.depth(), 0);
    }

    #[test]
    fn test_block_ignores_threshold() {
        let (mut p, sink) = processor(2);
        p.push_all(["{", "a", "b", "c", "d", "e"]);
        assert!(sink.is_empty());

        p.push("}");
        assert_eq!(sink.batches(), vec!["bulk: a b c d e\n"]);
    }

    #[test]
    fn test_nested_blocks_flush_at_outermost_close() {
        let (mut p, sink) = processor(3);
        p.push_all(["{", "a", "{", "b", "}", "c"]);
        assert!(sink.is_empty());
        assert_eq!(p.depth(), 1);

        p.push("}");
        assert_eq!(sink.batches(), vec!["bulk: a b c\n"]);
    }

    #[test]
    fn test_open_block_with_nothing_pending_emits_nothing() {
        let (mut p, sink) = processor(3);
        p.push_all(["{", "}"]);

        assert!(sink.is_empty());
    }

    #[test]
    fn test_empty_lines_ignored() {
        let (mut p, sink) = processor(2);
        p.push_all(["a", "", "", "b"]);

        assert_eq!(sink.batches(), vec!["bulk: a b\n"]);
    }

    #[test]
    fn test_empty_line_does_not_count() {
        let (mut p, _sink) = processor(5);
        p.push("a");
        p.push("");

        assert_eq!(p.counter(), 1);
    }

    #[test]
    fn test_resize_applies_to_following_lines() {
        let (mut p, sink) = processor(3);
        p.push_all(["a", "b", "=2"]);
        assert!(sink.is_empty());
        assert_eq!(p.threshold(), 2);
        assert_eq!(p.counter(), 0);

        // "a" and "b" are not recounted, two new lines are needed.
        p.push("c");
        assert!(sink.is_empty());
        p.push("d");
        assert_eq!(sink.batches(), vec!["bulk: a b c d\n"]);
    }

    #[test]
    fn test_resize_negative_uses_absolute_value() {
        let (mut p, _sink) = processor(3);
        p.push("=-4");

        assert_eq!(p.threshold(), 4);
    }

    #[test]
    fn test_zero_threshold_never_flushes_by_count() {
        let (mut p, sink) = processor(3);
        p.push("=oops");
        assert_eq!(p.threshold(), 0);

        p.push_all(["a", "b", "c", "d", "e", "f", "g"]);
        assert!(sink.is_empty());

        // Blocks still flush.
        p.push("{");
        assert_eq!(sink.batches(), vec!["bulk: a b c d e f g\n"]);
    }

    #[test]
    fn test_resize_inside_block() {
        let (mut p, sink) = processor(3);
        p.push_all(["{", "a", "=1", "b", "}"]);
        assert_eq!(sink.batches(), vec!["bulk: a b\n"]);

        p.push("c");
        assert_eq!(sink.batches(), vec!["bulk: a b\n", "bulk: c\n"]);
    }

    #[test]
    fn test_unmatched_close_is_ignored() {
        let (mut p, sink) = processor(3);
        p.push_all(["a", "}"]);

        assert_eq!(p.depth(), 0);
        assert_eq!(p.counter(), 0);
        assert!(sink.is_empty());
        assert_eq!(p.pending(), ["a"]);

        // A following block behaves normally.
        p.push_all(["{", "b", "}"]);
        assert_eq!(sink.batches(), vec!["bulk: a\n", "bulk: b\n"]);
    }

    #[test]
    fn test_marker_resets_counter() {
        let (mut p, sink) = processor(3);
        p.push_all(["a", "b", "}", "c"]);
        assert!(sink.is_empty());

        p.push_all(["d", "e"]);
        assert_eq!(sink.batches(), vec!["bulk: a b c d e\n"]);
    }

    #[test]
    fn test_drop_flushes_at_depth_zero() {
        let sink = Arc::new(MemorySink::new());
        {
            let mut p = Processor::new(3, sink.clone());
            p.push("a");
        }

        assert_eq!(sink.batches(), vec!["bulk: a\n"]);
    }

    #[test]
    fn test_drop_discards_unterminated_block() {
        let sink = Arc::new(MemorySink::new());
        {
            let mut p = Processor::new(3, sink.clone());
            p.push_all(["a", "{", "b"]);
        }

        assert_eq!(sink.batches(), vec!["bulk: a\n"]);
    }

    #[test]
    fn test_finish_runs_once() {
        let (mut p, sink) = processor(3);
        p.push("a");
        p.finish();
        p.finish();
        drop(p);

        assert_eq!(sink.batches(), vec!["bulk: a\n"]);
    }

    #[test]
    fn test_finish_with_nothing_pending_emits_nothing() {
        let (mut p, sink) = processor(2);
        p.push_all(["a", "b"]);
        p.finish();

        assert_eq!(sink.len(), 1);
    }
}
