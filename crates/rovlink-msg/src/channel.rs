//! ---
//! rovlink_section: "02-wire-protocols"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Newline-delimited command channel over the serial link."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tracing::trace;

use crate::command::CommandLine;

/// Faults raised by either end of the command channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Bytes stopped arriving mid-line; they were discarded.
    #[error("partial line discarded after {discarded} bytes")]
    PartialLine {
        /// Bytes dropped.
        discarded: usize,
    },
    /// A line exceeded the configured maximum and was discarded.
    #[error("line exceeds {max} bytes")]
    LineTooLong {
        /// Configured maximum.
        max: usize,
    },
    /// A complete line was not valid UTF-8.
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
    /// The transport reached end of stream.
    #[error("serial transport closed")]
    Closed,
    /// Underlying I/O failure.
    #[error("serial io error: {0}")]
    Io(#[from] io::Error),
}

impl ChannelError {
    /// True when the transport must be reopened; other faults only cost one line.
    pub fn is_transport(&self) -> bool {
        matches!(self, ChannelError::Closed | ChannelError::Io(_))
    }

    /// Short label used for metrics and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            ChannelError::PartialLine { .. } => "partial_line",
            ChannelError::LineTooLong { .. } => "line_too_long",
            ChannelError::InvalidUtf8 => "invalid_utf8",
            ChannelError::Closed => "closed",
            ChannelError::Io(_) => "io",
        }
    }
}

/// Sending half: appends the terminator, writes and flushes. No acknowledgement, no retry.
#[derive(Debug)]
pub struct CommandWriter<W> {
    inner: W,
    scratch: Vec<u8>,
    lines_sent: u64,
}

impl<W: AsyncWrite + Unpin> CommandWriter<W> {
    /// Wrap a writable transport.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            scratch: Vec::with_capacity(64),
            lines_sent: 0,
        }
    }

    /// Send one line.
    pub async fn send(&mut self, line: &CommandLine) -> Result<(), ChannelError> {
        self.scratch.clear();
        self.scratch.extend_from_slice(line.as_str().as_bytes());
        self.scratch.push(b'\n');
        self.inner.write_all(&self.scratch).await?;
        self.inner.flush().await?;
        self.lines_sent += 1;
        trace!(line = %line, "command line sent");
        Ok(())
    }

    /// Lines written so far.
    pub fn lines_sent(&self) -> u64 {
        self.lines_sent
    }

    /// Release the transport.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Result of one receive window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceivedLine {
    /// A complete line without its terminator.
    Line(String),
    /// No byte arrived within the idle window.
    Idle,
}

/// Read deadlines for the receiving half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineTimeouts {
    /// Wait for the first byte of a line.
    pub idle: Duration,
    /// Wait between bytes once a line has started.
    pub inter_byte: Duration,
}

impl Default for LineTimeouts {
    fn default() -> Self {
        Self {
            idle: Duration::from_millis(50),
            inter_byte: Duration::from_millis(5),
        }
    }
}

/// Receiving half: assembles lines under idle and inter-byte deadlines.
pub struct LineReceiver<R> {
    reader: BufReader<R>,
    timeouts: LineTimeouts,
    max_line_len: usize,
    line: Vec<u8>,
    skipping: bool,
}

impl<R: AsyncRead + Unpin> LineReceiver<R> {
    /// Wrap a readable transport.
    pub fn new(reader: R, timeouts: LineTimeouts, max_line_len: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            timeouts,
            max_line_len,
            line: Vec::with_capacity(max_line_len),
            skipping: false,
        }
    }

    /// Wait for the next line.
    ///
    /// Returns [`ReceivedLine::Idle`] when nothing arrives within the idle window. Partial,
    /// oversized and non-UTF-8 lines are discarded and reported as errors; the receiver stays
    /// usable afterwards. [`ChannelError::Closed`] and [`ChannelError::Io`] are terminal.
    pub async fn next_line(&mut self) -> Result<ReceivedLine, ChannelError> {
        self.line.clear();
        let mut window = self.timeouts.idle;
        loop {
            let available = match timeout(window, self.reader.fill_buf()).await {
                Ok(Ok(buf)) => buf,
                Ok(Err(err)) => return Err(err.into()),
                Err(_) => {
                    self.skipping = false;
                    if self.line.is_empty() {
                        return Ok(ReceivedLine::Idle);
                    }
                    let discarded = self.line.len();
                    self.line.clear();
                    return Err(ChannelError::PartialLine { discarded });
                }
            };
            if available.is_empty() {
                return Err(ChannelError::Closed);
            }

            let newline = available.iter().position(|b| *b == b'\n');
            let (consumed, complete) = match newline {
                Some(idx) => (idx + 1, true),
                None => (available.len(), false),
            };
            if !self.skipping {
                let end = newline.unwrap_or(available.len());
                self.line.extend_from_slice(&available[..end]);
            }
            self.reader.consume(consumed);

            if self.skipping {
                if complete {
                    self.skipping = false;
                    window = self.timeouts.idle;
                } else {
                    window = self.timeouts.inter_byte;
                }
                continue;
            }

            if self.line.len() > self.max_line_len {
                self.line.clear();
                self.skipping = !complete;
                return Err(ChannelError::LineTooLong {
                    max: self.max_line_len,
                });
            }

            if complete {
                let bytes = std::mem::take(&mut self.line);
                return String::from_utf8(bytes)
                    .map(ReceivedLine::Line)
                    .map_err(|_| ChannelError::InvalidUtf8);
            }
            window = self.timeouts.inter_byte;
        }
    }
}
