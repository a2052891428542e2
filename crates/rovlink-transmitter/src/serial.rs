//! ---
//! rovlink_section: "05-transmitter-control-plane"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Single-writer serial sink fed by a bounded command queue."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::io;

use async_trait::async_trait;
use rovlink_common::SerialEndpoint;
use rovlink_metrics::TransmitterMetrics;
use rovlink_msg::{CommandLine, CommandWriter};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::control::{CommandSink, SinkError};

/// Type-erased serial transport.
pub type SerialWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Open the transmit side of the serial link.
///
/// Line settings (115200 baud, 8N1) for a tty device are applied outside the process.
pub async fn open_serial_writer(endpoint: &SerialEndpoint) -> io::Result<SerialWriter> {
    match endpoint {
        SerialEndpoint::Device { path } => {
            let file = OpenOptions::new().write(true).open(path).await?;
            Ok(Box::new(file))
        }
        SerialEndpoint::Tcp { address } => {
            let stream = TcpStream::connect(address).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream))
        }
    }
}

/// Counts reported by the writer task when the queue closes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriterSummary {
    pub sent: u64,
    pub dropped: u64,
}

/// [`CommandSink`] feeding one writer task, so the serial link has exactly one producer.
#[derive(Debug, Clone)]
pub struct SerialCommandSink {
    queue: mpsc::Sender<CommandLine>,
}

impl SerialCommandSink {
    /// Drain the queue into an already open transport. Write failures drop the line.
    pub fn spawn<W>(
        writer: W,
        capacity: usize,
        metrics: Option<TransmitterMetrics>,
    ) -> (Self, JoinHandle<WriterSummary>)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        let writer: SerialWriter = Box::new(writer);
        let task = tokio::spawn(drain_queue(rx, Some(writer), None, metrics));
        (Self { queue }, task)
    }

    /// Open `endpoint` and drain the queue into it, reopening after a write failure.
    pub async fn open(
        endpoint: SerialEndpoint,
        capacity: usize,
        metrics: Option<TransmitterMetrics>,
    ) -> io::Result<(Self, JoinHandle<WriterSummary>)> {
        let writer = open_serial_writer(&endpoint).await?;
        info!(endpoint = %endpoint, "serial link open");
        let (queue, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(drain_queue(rx, Some(writer), Some(endpoint), metrics));
        Ok((Self { queue }, task))
    }
}

#[async_trait]
impl CommandSink for SerialCommandSink {
    async fn submit(&self, line: CommandLine) -> Result<(), SinkError> {
        self.queue.send(line).await.map_err(|_| SinkError::Closed)
    }
}

async fn drain_queue(
    mut rx: mpsc::Receiver<CommandLine>,
    writer: Option<SerialWriter>,
    endpoint: Option<SerialEndpoint>,
    metrics: Option<TransmitterMetrics>,
) -> WriterSummary {
    let mut summary = WriterSummary::default();
    let mut channel = writer.map(CommandWriter::new);

    while let Some(line) = rx.recv().await {
        if channel.is_none() {
            if let Some(endpoint) = &endpoint {
                match open_serial_writer(endpoint).await {
                    Ok(writer) => {
                        info!(endpoint = %endpoint, "serial link reopened");
                        channel = Some(CommandWriter::new(writer));
                    }
                    Err(err) => {
                        warn!(endpoint = %endpoint, error = %err, line = %line, "serial link unavailable; command dropped");
                    }
                }
            }
        }
        let Some(active) = channel.as_mut() else {
            summary.dropped += 1;
            continue;
        };

        match active.send(&line).await {
            Ok(()) => {
                summary.sent += 1;
                info!(line = %line, "command forwarded");
                if let Some(metrics) = &metrics {
                    metrics.record_forwarded(line.kind());
                }
            }
            Err(err) => {
                summary.dropped += 1;
                warn!(error = %err, line = %line, "serial write failed; command dropped");
                if endpoint.is_some() {
                    channel = None;
                }
            }
        }
    }
    info!(sent = summary.sent, dropped = summary.dropped, "serial writer stopped");
    summary
}
