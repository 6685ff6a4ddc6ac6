//! Single-stream runner.
//!
//! Feeds every line of one input (usually stdin) to a processor. At end of
//! input the processor is dropped, which flushes any pending batch unless a
//! block is still open.
//!
//! Lines are bounded by `MAX_LINE_LENGTH`, as on the network.

use std::io;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, error};

use bulk_core::Processor;
use bulk_protocol::MAX_LINE_LENGTH;

/// Reads `reader` to EOF, pushing each line into `processor`.
///
/// Returns the number of lines read. A trailing line without a newline is
/// still processed.
///
/// # Errors
///
/// Returns an `InvalidData` error for a line longer than `MAX_LINE_LENGTH`,
/// and any read error as is. The processor is dropped the same way as at
/// EOF before the error is returned.
pub async fn run_stream<R>(reader: R, mut processor: Processor) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let mut count = 0;

    while let Some(next) = lines.next().await {
        match next {
            Ok(line) => {
                processor.push(&line);
                count += 1;
            }
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                error!(line = count + 1, max = MAX_LINE_LENGTH, "Input line too long");
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line {} exceeds {MAX_LINE_LENGTH} bytes", count + 1),
                ));
            }
            Err(LinesCodecError::Io(e)) => return Err(e),
        }
    }

    debug!(lines = count, "Input exhausted");
    drop(processor);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bulk_core::MemorySink;

    async fn run(input: &[u8], threshold: usize) -> (io::Result<usize>, Vec<String>) {
        let sink = Arc::new(MemorySink::new());
        let processor = Processor::new(threshold, sink.clone());
        let result = run_stream(input, processor).await;
        (result, sink.batches())
    }

    #[tokio::test]
    async fn test_batches_by_threshold() {
        let (count, batches) = run(b"cmd1\ncmd2\ncmd3\ncmd4\ncmd5\n", 3).await;

        assert_eq!(count.unwrap(), 5);
        assert_eq!(batches, vec!["bulk: cmd1 cmd2 cmd3\n", "bulk: cmd4 cmd5\n"]);
    }

    #[tokio::test]
    async fn test_nested_blocks() {
        let input = b"cmd1\ncmd2\n{\ncmd3\ncmd4\n}\n{\ncmd5\ncmd6\n{\ncmd7\ncmd8\n}\ncmd9\n}\n{\ncmd10\ncmd11\n";
        let (_, batches) = run(input, 3).await;

        assert_eq!(
            batches,
            vec![
                "bulk: cmd1 cmd2\n",
                "bulk: cmd3 cmd4\n",
                "bulk: cmd5 cmd6 cmd7 cmd8 cmd9\n",
            ]
        );
    }

    #[tokio::test]
    async fn test_unterminated_last_line() {
        let (count, batches) = run(b"a\nb", 5).await;

        assert_eq!(count.unwrap(), 2);
        assert_eq!(batches, vec!["bulk: a b\n"]);
    }

    #[tokio::test]
    async fn test_crlf_line_endings() {
        let (_, batches) = run(b"a\r\nb\r\n", 2).await;

        assert_eq!(batches, vec!["bulk: a b\n"]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let (count, batches) = run(b"", 3).await;

        assert_eq!(count.unwrap(), 0);
        assert!(batches.is_empty());
    }

    #[tokio::test]
    async fn test_line_at_max_length_is_accepted() {
        let mut input = vec![b'y'; MAX_LINE_LENGTH];
        input.push(b'\n');
        let (count, batches) = run(&input, 1).await;

        assert_eq!(count.unwrap(), 1);
        assert_eq!(batches[0].len(), "bulk: ".len() + MAX_LINE_LENGTH + 1);
    }

    #[tokio::test]
    async fn test_oversized_line_is_rejected() {
        let mut input = b"a\nb\n".to_vec();
        input.extend(std::iter::repeat(b'x').take(5_000_000));
        input.extend_from_slice(b"\nc\n");
        let (result, batches) = run(&input, 5).await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        // Commands before the oversized line are flushed, nothing after it.
        assert_eq!(batches, vec!["bulk: a b\n"]);
    }
}
