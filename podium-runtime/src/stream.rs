//! Line-oriented demultiplexing of the runtime's combined log stream.
//!
//! The engine multiplexes stdout and stderr over one connection; bollard
//! splits the 8-byte framing into [`LogOutput`] chunks, but chunk boundaries
//! do not line up with line boundaries. [`LineDemux`] buffers partial lines
//! per stream and emits complete `{stream, line}` events.

use bollard::container::LogOutput;
use bollard::errors::Error as DockerError;
use futures_util::{stream, Stream, StreamExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdStream {
    Stdout,
    Stderr,
}

impl StdStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            StdStream::Stdout => "stdout",
            StdStream::Stderr => "stderr",
        }
    }
}

/// One line of output from a workspace, tagged with its origin stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub stream: StdStream,
    pub line: String,
}

#[derive(Debug, Default)]
pub struct LineDemux {
    stdout_buf: Vec<u8>,
    stderr_buf: Vec<u8>,
}

impl LineDemux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the complete lines it closed off.
    pub fn push(&mut self, chunk: &LogOutput) -> Vec<LogLine> {
        match chunk {
            LogOutput::StdOut { message } | LogOutput::Console { message } => {
                Self::feed(&mut self.stdout_buf, message, StdStream::Stdout)
            }
            LogOutput::StdErr { message } => {
                Self::feed(&mut self.stderr_buf, message, StdStream::Stderr)
            }
            LogOutput::StdIn { .. } => Vec::new(),
        }
    }

    /// Flush whatever partial lines remain. Call once at end of stream.
    pub fn finish(&mut self) -> Vec<LogLine> {
        let mut lines = Vec::new();
        for (buf, stream) in [
            (&mut self.stdout_buf, StdStream::Stdout),
            (&mut self.stderr_buf, StdStream::Stderr),
        ] {
            if !buf.is_empty() {
                let line = String::from_utf8_lossy(buf).trim_end_matches('\r').to_string();
                if !line.is_empty() {
                    lines.push(LogLine { stream, line });
                }
                buf.clear();
            }
        }
        lines
    }

    fn feed(buf: &mut Vec<u8>, message: &[u8], stream: StdStream) -> Vec<LogLine> {
        let mut lines = Vec::new();
        for byte in message {
            if *byte == b'\n' {
                let line = String::from_utf8_lossy(buf).trim_end_matches('\r').to_string();
                buf.clear();
                if !line.is_empty() {
                    lines.push(LogLine { stream, line });
                }
            } else {
                buf.push(*byte);
            }
        }
        lines
    }
}

/// Turn a raw chunk stream into a lazy sequence of line events.
///
/// The sequence ends when the source ends (object stopped, or non-follow tail
/// exhausted); a trailing partial line is flushed as a final event. Dropping
/// the returned stream drops the underlying subscription.
pub fn line_events<S>(source: S) -> impl Stream<Item = LogLine>
where
    S: Stream<Item = std::result::Result<LogOutput, DockerError>>,
{
    source
        .map(Some)
        .chain(stream::once(futures_util::future::ready(None)))
        .scan(LineDemux::new(), |demux, item| {
            let lines = match item {
                Some(Ok(chunk)) => demux.push(&chunk),
                // Transport error or end of stream: flush what we have.
                Some(Err(_)) | None => demux.finish(),
            };
            futures_util::future::ready(Some(lines))
        })
        .flat_map(stream::iter)
}

/// Drain a chunk stream, concatenating the raw bytes of each output stream.
/// Used by the deployment pipeline to read helper output back verbatim.
pub async fn collect_chunks<S>(mut source: S) -> (String, String)
where
    S: Stream<Item = std::result::Result<LogOutput, DockerError>> + Unpin,
{
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    while let Some(chunk) = source.next().await {
        match chunk {
            Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                stdout.extend_from_slice(&message)
            }
            Ok(LogOutput::StdErr { message }) => stderr.extend_from_slice(&message),
            Ok(LogOutput::StdIn { .. }) => {}
            Err(_) => break,
        }
    }
    (
        String::from_utf8_lossy(&stdout).into_owned(),
        String::from_utf8_lossy(&stderr).into_owned(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn out(bytes: &[u8]) -> LogOutput {
        LogOutput::StdOut {
            message: Bytes::copy_from_slice(bytes),
        }
    }

    fn err(bytes: &[u8]) -> LogOutput {
        LogOutput::StdErr {
            message: Bytes::copy_from_slice(bytes),
        }
    }

    #[test]
    fn splits_complete_lines() {
        let mut demux = LineDemux::new();
        let lines = demux.push(&out(b"one\ntwo\n"));
        assert_eq!(
            lines,
            vec![
                LogLine {
                    stream: StdStream::Stdout,
                    line: "one".into()
                },
                LogLine {
                    stream: StdStream::Stdout,
                    line: "two".into()
                },
            ]
        );
    }

    #[test]
    fn buffers_partial_lines_across_chunks() {
        let mut demux = LineDemux::new();
        assert!(demux.push(&out(b"hel")).is_empty());
        let lines = demux.push(&out(b"lo\nwor"));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].line, "hello");
        let rest = demux.finish();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].line, "wor");
    }

    #[test]
    fn keeps_streams_independent() {
        let mut demux = LineDemux::new();
        assert!(demux.push(&out(b"a")).is_empty());
        let lines = demux.push(&err(b"oops\n"));
        assert_eq!(lines[0].stream, StdStream::Stderr);
        assert_eq!(lines[0].line, "oops");
        let rest = demux.finish();
        assert_eq!(rest[0].stream, StdStream::Stdout);
        assert_eq!(rest[0].line, "a");
    }

    #[test]
    fn strips_carriage_returns_and_skips_blank_lines() {
        let mut demux = LineDemux::new();
        let lines = demux.push(&out(b"one\r\n\r\n\ntwo\r\n"));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line, "one");
        assert_eq!(lines[1].line, "two");
    }

    #[tokio::test]
    async fn line_events_flushes_trailing_partial() {
        let chunks: Vec<std::result::Result<LogOutput, DockerError>> =
            vec![Ok(out(b"first\nsec")), Ok(out(b"ond"))];
        let lines: Vec<LogLine> = line_events(stream::iter(chunks)).collect().await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line, "first");
        assert_eq!(lines[1].line, "second");
    }

    #[tokio::test]
    async fn collect_chunks_concatenates_raw_bytes() {
        let chunks: Vec<std::result::Result<LogOutput, DockerError>> = vec![
            Ok(out(b"abc123")),
            Ok(err(b"warning")),
            Ok(out(b"\n")),
        ];
        let (stdout, stderr) = collect_chunks(stream::iter(chunks)).await;
        assert_eq!(stdout, "abc123\n");
        assert_eq!(stderr, "warning");
    }
}
