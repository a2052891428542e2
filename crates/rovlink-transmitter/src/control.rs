//! ---
//! rovlink_section: "05-transmitter-control-plane"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "HTTP control endpoint translating requests into command lines."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, HeaderValue, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use rovlink_metrics::TransmitterMetrics;
use rovlink_msg::{CommandLine, CommandLineError};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::form_urlencoded;

const CONTROL_PAGE: &str = include_str!("assets/control_page.html");

/// What a request target asks the transmitter to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpRequestIntent {
    ServePage,
    /// Raw, percent-decoded `cmd` value; empty when absent.
    Move(String),
    Arm(ArmQuery),
}

impl HttpRequestIntent {
    /// Classify a request target (`path?query`) by path prefix.
    pub fn from_target(target: &str) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        if path.starts_with("/move") {
            let token = last_value(query, "cmd").unwrap_or_default();
            HttpRequestIntent::Move(token)
        } else if path.starts_with("/arm") {
            HttpRequestIntent::Arm(ArmQuery {
                base: last_value(query, "b"),
                shoulder: last_value(query, "h"),
                elbow: last_value(query, "c"),
            })
        } else {
            HttpRequestIntent::ServePage
        }
    }
}

fn last_value(query: &str, key: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .filter(|(name, _)| name == key)
        .last()
        .map(|(_, value)| value.into_owned())
}

/// Unvalidated `/arm` parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArmQuery {
    pub base: Option<String>,
    pub shoulder: Option<String>,
    pub elbow: Option<String>,
}

/// Reasons an `/arm` request is answered with `ERR`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationFault {
    #[error("missing parameter {0}")]
    MissingParameter(&'static str),
    #[error("parameter {param} is not a finite number: {value:?}")]
    InvalidNumber { param: &'static str, value: String },
    #[error(transparent)]
    Line(#[from] CommandLineError),
}

impl ArmQuery {
    /// Validate all three parameters and build `ARM:<b>,<h>,<c>`.
    pub fn to_command_line(&self) -> Result<CommandLine, ValidationFault> {
        let base = finite_param("b", self.base.as_deref())?;
        let shoulder = finite_param("h", self.shoulder.as_deref())?;
        let elbow = finite_param("c", self.elbow.as_deref())?;
        Ok(CommandLine::for_arm(base, shoulder, elbow)?)
    }
}

fn finite_param(param: &'static str, value: Option<&str>) -> Result<f32, ValidationFault> {
    let raw = value.ok_or(ValidationFault::MissingParameter(param))?;
    raw.parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValidationFault::InvalidNumber {
            param,
            value: raw.to_owned(),
        })
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("command queue closed")]
    Closed,
}

/// Destination for command lines produced by the control endpoint.
#[async_trait]
pub trait CommandSink: Send + Sync + 'static {
    /// Hand a line to the serial channel; may wait while the queue is full.
    async fn submit(&self, line: CommandLine) -> Result<(), SinkError>;
}

struct ControlState {
    sink: Arc<dyn CommandSink>,
    metrics: Option<TransmitterMetrics>,
}

/// Builder used to configure and spawn the control endpoint.
#[derive(Clone)]
pub struct ControlServerBuilder {
    listen: SocketAddr,
    sink: Arc<dyn CommandSink>,
    metrics: Option<TransmitterMetrics>,
}

impl ControlServerBuilder {
    pub fn new(listen: SocketAddr, sink: Arc<dyn CommandSink>) -> Self {
        Self {
            listen,
            sink,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: TransmitterMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Bind the listener and serve until the returned handle is shut down.
    pub async fn spawn(self) -> anyhow::Result<ControlServerHandle> {
        let listener = TcpListener::bind(self.listen).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "control endpoint listening");

        let state = ControlState {
            sink: self.sink,
            metrics: self.metrics,
        };
        let router = Router::new()
            .fallback(handle_request)
            .with_state(Arc::new(state));

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        let task = tokio::spawn(async move {
            if let Err(err) = server.await {
                warn!(error = %err, "control endpoint exited with error");
            }
        });

        Ok(ControlServerHandle {
            address: local_addr,
            task,
            shutdown: shutdown_tx,
        })
    }
}

/// Handle returned from [`ControlServerBuilder::spawn`].
pub struct ControlServerHandle {
    address: SocketAddr,
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl ControlServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Stop accepting requests and wait for in-flight ones to finish.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(()) => Ok(()),
            Err(join) => Err(anyhow::anyhow!(join)),
        }
    }
}

async fn handle_request(State(state): State<Arc<ControlState>>, uri: Uri) -> Response {
    let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    match HttpRequestIntent::from_target(target) {
        HttpRequestIntent::ServePage => page_response(),
        HttpRequestIntent::Move(token) => match CommandLine::for_move_token(&token) {
            Ok(line) => forward(&state, line).await,
            Err(err) => reject(&state, target, &err),
        },
        HttpRequestIntent::Arm(query) => match query.to_command_line() {
            Ok(line) => forward(&state, line).await,
            Err(fault) => reject(&state, target, &fault),
        },
    }
}

async fn forward(state: &ControlState, line: CommandLine) -> Response {
    let kind = line.kind();
    debug!(line = %line, "forwarding command");
    match state.sink.submit(line).await {
        Ok(()) => plain_response("OK"),
        Err(err) => {
            warn!(error = %err, kind, "command not forwarded");
            if let Some(metrics) = &state.metrics {
                metrics.inc_rejected_request();
            }
            plain_response("ERR")
        }
    }
}

fn reject(state: &ControlState, target: &str, reason: &dyn std::fmt::Display) -> Response {
    debug!(request = target, %reason, "control request rejected");
    if let Some(metrics) = &state.metrics {
        metrics.inc_rejected_request();
    }
    plain_response("ERR")
}

fn plain_response(body: &'static str) -> Response {
    with_headers("text/plain", body)
}

fn page_response() -> Response {
    with_headers("text/html", CONTROL_PAGE)
}

fn with_headers(content_type: &'static str, body: &'static str) -> Response {
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONNECTION, HeaderValue::from_static("close")),
        ],
        body,
    )
        .into_response()
}
