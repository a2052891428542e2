//! ---
//! rovlink_section: "03-logging-metrics"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Metrics collection and export utilities."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across processes.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let local_addr = std_listener
        .local_addr()
        .with_context(|| "failed to read metrics listener address")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %local_addr, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr: local_addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

/// Prometheus scrape endpoint.
async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("metrics encoding error"),
            )
                .into_response()
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Return the bound address for convenience.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics recorded by the transmitter (camera + radio controller).
#[derive(Clone, Debug)]
pub struct TransmitterMetrics {
    link_state: IntGauge,
    link_reconnects: IntCounter,
    association_attempts: IntCounter,
    commands_forwarded: IntCounterVec,
    requests_rejected: IntCounter,
    frames_streamed: IntCounter,
    stream_sessions: IntCounter,
    streams_rejected: IntCounter,
    stream_faults: IntCounterVec,
}

impl TransmitterMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let link_state = IntGauge::with_opts(Opts::new(
            "rovlink_link_state",
            "Wi-Fi link state (0 = disconnected, 1 = connecting, 2 = connected)",
        ))?;
        registry.register(Box::new(link_state.clone()))?;

        let link_reconnects = IntCounter::with_opts(Opts::new(
            "rovlink_link_reconnects_total",
            "Reconnections performed by the Wi-Fi watchdog",
        ))?;
        registry.register(Box::new(link_reconnects.clone()))?;

        let association_attempts = IntCounter::with_opts(Opts::new(
            "rovlink_association_attempts_total",
            "Association requests issued to the radio",
        ))?;
        registry.register(Box::new(association_attempts.clone()))?;

        let commands_forwarded = IntCounterVec::new(
            Opts::new(
                "rovlink_commands_forwarded_total",
                "Command lines handed to the serial channel by kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(commands_forwarded.clone()))?;

        let requests_rejected = IntCounter::with_opts(Opts::new(
            "rovlink_requests_rejected_total",
            "Control requests answered with ERR",
        ))?;
        registry.register(Box::new(requests_rejected.clone()))?;

        let frames_streamed = IntCounter::with_opts(Opts::new(
            "rovlink_frames_streamed_total",
            "Video messages fully written to a viewer",
        ))?;
        registry.register(Box::new(frames_streamed.clone()))?;

        let stream_sessions = IntCounter::with_opts(Opts::new(
            "rovlink_stream_sessions_total",
            "Streaming sessions started",
        ))?;
        registry.register(Box::new(stream_sessions.clone()))?;

        let streams_rejected = IntCounter::with_opts(Opts::new(
            "rovlink_streams_rejected_total",
            "Streaming connections refused because a session was already active",
        ))?;
        registry.register(Box::new(streams_rejected.clone()))?;

        let stream_faults = IntCounterVec::new(
            Opts::new(
                "rovlink_stream_faults_total",
                "Streaming sessions ended by a fault, by fault kind",
            ),
            &["fault"],
        )?;
        registry.register(Box::new(stream_faults.clone()))?;

        Ok(Self {
            link_state,
            link_reconnects,
            association_attempts,
            commands_forwarded,
            requests_rejected,
            frames_streamed,
            stream_sessions,
            streams_rejected,
            stream_faults,
        })
    }

    pub fn set_link_state(&self, level: i64) {
        self.link_state.set(level);
    }

    pub fn inc_reconnect(&self) {
        self.link_reconnects.inc();
    }

    pub fn inc_association_attempt(&self) {
        self.association_attempts.inc();
    }

    pub fn record_forwarded(&self, kind: &str) {
        self.commands_forwarded.with_label_values(&[kind]).inc();
    }

    pub fn inc_rejected_request(&self) {
        self.requests_rejected.inc();
    }

    pub fn inc_frame(&self) {
        self.frames_streamed.inc();
    }

    pub fn inc_session(&self) {
        self.stream_sessions.inc();
    }

    pub fn inc_stream_rejected(&self) {
        self.streams_rejected.inc();
    }

    pub fn record_stream_fault(&self, fault: &str) {
        self.stream_faults.with_label_values(&[fault]).inc();
    }
}

/// Metrics recorded by the receiver (motor + arm controller).
#[derive(Clone, Debug)]
pub struct ReceiverMetrics {
    commands_executed: IntCounterVec,
    commands_dropped: IntCounterVec,
    idle_polls: IntCounter,
    channel_faults: IntCounterVec,
}

impl ReceiverMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let commands_executed = IntCounterVec::new(
            Opts::new(
                "rovlink_commands_executed_total",
                "Commands dispatched to an actuator by kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(commands_executed.clone()))?;

        let commands_dropped = IntCounterVec::new(
            Opts::new(
                "rovlink_commands_dropped_total",
                "Malformed command lines dropped by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(commands_dropped.clone()))?;

        let idle_polls = IntCounter::with_opts(Opts::new(
            "rovlink_serial_idle_polls_total",
            "Serial read windows that elapsed without data",
        ))?;
        registry.register(Box::new(idle_polls.clone()))?;

        let channel_faults = IntCounterVec::new(
            Opts::new(
                "rovlink_serial_faults_total",
                "Serial channel faults by kind",
            ),
            &["fault"],
        )?;
        registry.register(Box::new(channel_faults.clone()))?;

        Ok(Self {
            commands_executed,
            commands_dropped,
            idle_polls,
            channel_faults,
        })
    }

    pub fn record_executed(&self, kind: &str) {
        self.commands_executed.with_label_values(&[kind]).inc();
    }

    pub fn record_dropped(&self, reason: &str) {
        self.commands_dropped.with_label_values(&[reason]).inc();
    }

    pub fn inc_idle_poll(&self) {
        self.idle_polls.inc();
    }

    pub fn record_channel_fault(&self, fault: &str) {
        self.channel_faults.with_label_values(&[fault]).inc();
    }
}

/// Metrics recorded by the viewer.
#[derive(Clone, Debug)]
pub struct ViewerMetrics {
    frames_decoded: IntCounter,
    protocol_faults: IntCounterVec,
    bytes_discarded: IntCounter,
    connections: IntCounter,
}

impl ViewerMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let frames_decoded = IntCounter::with_opts(Opts::new(
            "rovlink_frames_decoded_total",
            "Video frames decoded and presented",
        ))?;
        registry.register(Box::new(frames_decoded.clone()))?;

        let protocol_faults = IntCounterVec::new(
            Opts::new(
                "rovlink_protocol_faults_total",
                "Video protocol faults recovered by resynchronisation",
            ),
            &["fault"],
        )?;
        registry.register(Box::new(protocol_faults.clone()))?;

        let bytes_discarded = IntCounter::with_opts(Opts::new(
            "rovlink_resync_bytes_discarded_total",
            "Bytes skipped while seeking a frame marker",
        ))?;
        registry.register(Box::new(bytes_discarded.clone()))?;

        let connections = IntCounter::with_opts(Opts::new(
            "rovlink_viewer_connections_total",
            "Connections opened to the video stream",
        ))?;
        registry.register(Box::new(connections.clone()))?;

        Ok(Self {
            frames_decoded,
            protocol_faults,
            bytes_discarded,
            connections,
        })
    }

    pub fn inc_frame(&self) {
        self.frames_decoded.inc();
    }

    pub fn record_protocol_fault(&self, fault: &str) {
        self.protocol_faults.with_label_values(&[fault]).inc();
    }

    pub fn add_discarded(&self, bytes: u64) {
        self.bytes_discarded.inc_by(bytes);
    }

    pub fn inc_connection(&self) {
        self.connections.inc();
    }
}

pub use prometheus;
