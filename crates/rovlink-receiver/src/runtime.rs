//! ---
//! rovlink_section: "06-receiver-actuation"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Serial receive loop with session reopen."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rovlink_common::{AppConfig, SerialConfig, SerialEndpoint};
use rovlink_metrics::{prometheus::Registry, ReceiverMetrics};
use rovlink_msg::{ChannelError, LineReceiver, LineTimeouts, ReceivedLine};
use tokio::fs::OpenOptions;
use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::actuators::{SimulatedArm, SimulatedDrive};
use crate::executor::{CommandExecutor, DispatchError};

/// Type-erased receive side of the serial link.
pub type SerialReader = Box<dyn AsyncRead + Send + Unpin>;

/// Where serial sessions come from.
pub enum SerialSource {
    /// A tty, reopened after each failure.
    Device(PathBuf),
    /// A TCP bridge; each accepted peer is one session.
    Tcp(TcpListener),
}

impl SerialSource {
    /// Prepare the source. Binding a TCP bridge happens here so it fails at startup.
    pub async fn prepare(endpoint: &SerialEndpoint) -> io::Result<Self> {
        match endpoint {
            SerialEndpoint::Device { path } => Ok(SerialSource::Device(path.clone())),
            SerialEndpoint::Tcp { address } => {
                let listener = TcpListener::bind(address).await?;
                info!(address = %listener.local_addr()?, "serial bridge listening");
                Ok(SerialSource::Tcp(listener))
            }
        }
    }

    /// Wait for the next session.
    pub async fn open(&self) -> io::Result<SerialReader> {
        match self {
            SerialSource::Device(path) => {
                let file = OpenOptions::new().read(true).open(path).await?;
                Ok(Box::new(file))
            }
            SerialSource::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                info!(%peer, "serial bridge peer connected");
                Ok(Box::new(stream))
            }
        }
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        match self {
            SerialSource::Device(_) => None,
            SerialSource::Tcp(listener) => listener.local_addr().ok(),
        }
    }
}

/// Read, execute, repeat until the transport fails. Returns the terminal fault.
pub async fn serve_session<R>(
    receiver: &mut LineReceiver<R>,
    executor: &CommandExecutor,
    metrics: Option<&ReceiverMetrics>,
) -> ChannelError
where
    R: AsyncRead + Unpin,
{
    loop {
        match receiver.next_line().await {
            Ok(ReceivedLine::Idle) => {
                if let Some(metrics) = metrics {
                    metrics.inc_idle_poll();
                }
            }
            Ok(ReceivedLine::Line(line)) => {
                info!(line = %line.trim_end(), "command received");
                match executor.dispatch(&line).await {
                    Ok(done) => {
                        if let Some(metrics) = metrics {
                            metrics.record_executed(done.kind());
                        }
                    }
                    Err(err) => {
                        match &err {
                            DispatchError::Malformed(_) => {
                                warn!(line = %line.trim_end(), reason = %err, "command dropped")
                            }
                            DispatchError::Actuator(_) => {
                                error!(line = %line.trim_end(), error = %err, "actuator failed")
                            }
                        }
                        if let Some(metrics) = metrics {
                            metrics.record_dropped(err.reason());
                        }
                    }
                }
            }
            Err(err) if err.is_transport() => return err,
            Err(err) => {
                warn!(fault = err.label(), error = %err, "serial line discarded");
                if let Some(metrics) = metrics {
                    metrics.record_channel_fault(err.label());
                }
            }
        }
    }
}

/// Receiver service: sequential read, execute, read over one serial source.
pub struct Receiver {
    source: SerialSource,
    executor: CommandExecutor,
    timeouts: LineTimeouts,
    max_line_len: usize,
    reopen_delay: Duration,
    metrics: Option<ReceiverMetrics>,
}

impl Receiver {
    pub fn new(source: SerialSource, executor: CommandExecutor, serial: &SerialConfig) -> Self {
        Self {
            source,
            executor,
            timeouts: LineTimeouts {
                idle: serial.idle_timeout,
                inter_byte: serial.inter_byte_timeout,
            },
            max_line_len: serial.max_line_len,
            reopen_delay: Duration::from_secs(1),
            metrics: None,
        }
    }

    pub fn with_reopen_delay(mut self, delay: Duration) -> Self {
        self.reopen_delay = delay;
        self
    }

    pub fn with_metrics(mut self, metrics: ReceiverMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn source(&self) -> &SerialSource {
        &self.source
    }

    /// Serve sessions forever, reopening the source after each transport fault.
    pub async fn run(&self) {
        loop {
            match self.source.open().await {
                Ok(reader) => {
                    let mut lines = LineReceiver::new(reader, self.timeouts, self.max_line_len);
                    let fault = serve_session(&mut lines, &self.executor, self.metrics.as_ref()).await;
                    warn!(fault = fault.label(), error = %fault, "serial session ended");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_channel_fault(fault.label());
                    }
                }
                Err(err) => warn!(error = %err, "serial endpoint unavailable"),
            }
            tokio::time::sleep(self.reopen_delay).await;
        }
    }
}

/// Run the receiver with simulated actuators until `shutdown` resolves.
pub async fn run_receiver<F>(config: &AppConfig, registry: &Registry, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let metrics = ReceiverMetrics::new(registry).context("registering receiver metrics")?;
    let endpoint = &config.serial.endpoint;
    let source = SerialSource::prepare(endpoint)
        .await
        .with_context(|| format!("preparing serial endpoint {endpoint}"))?;
    if let SerialSource::Device(path) = &source {
        // fail fast on a missing device; later reopen failures are retried
        OpenOptions::new()
            .read(true)
            .open(path)
            .await
            .with_context(|| format!("opening serial device {}", path.display()))?;
    }

    let scale = config.receiver.time_scale;
    let executor = CommandExecutor::new(
        Arc::new(SimulatedDrive::new(scale)),
        Arc::new(SimulatedArm::new(scale)),
    );
    let receiver = Receiver::new(source, executor, &config.serial)
        .with_reopen_delay(config.receiver.reopen_delay)
        .with_metrics(metrics);

    info!(endpoint = %endpoint, "receiver ready");
    tokio::select! {
        _ = receiver.run() => {}
        _ = shutdown => info!("shutdown requested"),
    }
    info!("receiver stopped");
    Ok(())
}
