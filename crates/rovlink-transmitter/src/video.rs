//! ---
//! rovlink_section: "05-transmitter-control-plane"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Single-consumer video streaming server."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use rovlink_common::VideoConfig;
use rovlink_metrics::TransmitterMetrics;
use rovlink_msg::{FrameGeometry, TransportFault, VideoMessage};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use crate::camera::{Camera, CameraError};

/// Camera plus the one frame buffer it fills.
///
/// Owned by the server while idle and moved into the streaming session while a viewer is
/// connected.
pub struct CaptureRig {
    camera: Box<dyn Camera>,
    frame: Vec<u8>,
}

impl CaptureRig {
    pub fn new(camera: Box<dyn Camera>) -> Self {
        let frame = camera.geometry().allocate();
        Self { camera, frame }
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.camera.geometry()
    }
}

impl std::fmt::Debug for CaptureRig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureRig")
            .field("geometry", &self.geometry())
            .field("frame_len", &self.frame.len())
            .finish()
    }
}

/// Pacing and stall limits for a streaming session.
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub frame_interval: Duration,
    pub write_timeout: Duration,
}

impl From<&VideoConfig> for StreamSettings {
    fn from(config: &VideoConfig) -> Self {
        Self {
            frame_interval: config.frame_interval,
            write_timeout: config.write_timeout,
        }
    }
}

/// Why a streaming session ended.
#[derive(Debug, thiserror::Error)]
pub enum SessionEnd {
    #[error(transparent)]
    Transport(#[from] TransportFault),
    #[error("camera capture failed: {0}")]
    Camera(#[from] CameraError),
}

impl SessionEnd {
    fn label(&self) -> &'static str {
        match self {
            SessionEnd::Transport(fault) => fault.label(),
            SessionEnd::Camera(_) => "camera",
        }
    }
}

/// Streams frames to at most one viewer at a time; other connections are closed on accept.
pub struct VideoStreamServer {
    listener: TcpListener,
    rig: CaptureRig,
    settings: StreamSettings,
    metrics: Option<TransmitterMetrics>,
}

impl VideoStreamServer {
    pub async fn bind(
        listen: SocketAddr,
        rig: CaptureRig,
        settings: StreamSettings,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(listen).await?;
        Ok(Self {
            listener,
            rig,
            settings,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: TransmitterMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until the returned handle is shut down.
    pub fn spawn(self) -> io::Result<VideoStreamHandle> {
        let address = self.local_addr()?;
        info!(
            address = %address,
            geometry = ?self.rig.geometry(),
            "video stream listening"
        );
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.serve(shutdown_rx));
        Ok(VideoStreamHandle {
            address,
            task,
            shutdown,
        })
    }

    async fn serve(self, mut shutdown: watch::Receiver<bool>) {
        let VideoStreamServer {
            listener,
            rig,
            settings,
            metrics,
        } = self;
        let mut idle_rig = Some(rig);
        let mut session: Option<JoinHandle<(CaptureRig, SessionEnd)>> = None;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                finished = session_finished(&mut session) => {
                    session = None;
                    match finished {
                        Ok((rig, end)) => {
                            log_session_end(&end, metrics.as_ref());
                            idle_rig = Some(rig);
                        }
                        Err(err) => {
                            error!(error = %err, "streaming session aborted; capture rig lost");
                            break;
                        }
                    }
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            warn!(error = %err, "video accept failed");
                            continue;
                        }
                    };
                    match idle_rig.take() {
                        Some(rig) => {
                            info!(%peer, "video viewer connected");
                            if let Some(metrics) = &metrics {
                                metrics.inc_session();
                            }
                            session = Some(tokio::spawn(stream_session(
                                stream,
                                rig,
                                settings,
                                metrics.clone(),
                            )));
                        }
                        None => {
                            warn!(%peer, "video stream already in use; closing connection");
                            if let Some(metrics) = &metrics {
                                metrics.inc_stream_rejected();
                            }
                            drop(stream);
                        }
                    }
                }
            }
        }

        if let Some(session) = session {
            session.abort();
        }
        info!("video stream stopped");
    }
}

/// Handle returned from [`VideoStreamServer::spawn`].
pub struct VideoStreamHandle {
    address: SocketAddr,
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl VideoStreamHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(()) => Ok(()),
            Err(join) => Err(anyhow::anyhow!(join)),
        }
    }
}

async fn session_finished<T>(session: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match session.as_mut() {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

async fn stream_session(
    mut stream: TcpStream,
    mut rig: CaptureRig,
    settings: StreamSettings,
    metrics: Option<TransmitterMetrics>,
) -> (CaptureRig, SessionEnd) {
    if let Err(err) = stream.set_nodelay(true) {
        warn!(error = %err, "failed to disable nagle on video stream");
    }
    let end = loop {
        if let Err(err) = rig.camera.capture(&mut rig.frame).await {
            break SessionEnd::Camera(err);
        }
        if let Err(fault) = write_frame(&mut stream, &rig.frame, settings.write_timeout).await {
            break SessionEnd::Transport(fault);
        }
        if let Some(metrics) = &metrics {
            metrics.inc_frame();
        }
        sleep(settings.frame_interval).await;
    };
    (rig, end)
}

async fn write_frame(
    stream: &mut TcpStream,
    frame: &[u8],
    deadline: Duration,
) -> Result<(), TransportFault> {
    let message = VideoMessage::new(frame)
        .map_err(|err| TransportFault::Io(io::Error::new(io::ErrorKind::InvalidInput, err)))?;
    match timeout(deadline, message.write_to(stream)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) if peer_closed(&err) => Err(TransportFault::PeerClosed),
        Ok(Err(err)) => Err(TransportFault::Io(err)),
        Err(_) => Err(TransportFault::WriteStalled(deadline)),
    }
}

fn peer_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::WriteZero
    )
}

fn log_session_end(end: &SessionEnd, metrics: Option<&TransmitterMetrics>) {
    match end {
        SessionEnd::Transport(TransportFault::PeerClosed) => info!("video viewer disconnected"),
        other => warn!(reason = %other, "video session ended"),
    }
    if let Some(metrics) = metrics {
        metrics.record_stream_fault(end.label());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FailingCamera(FrameGeometry);

    #[async_trait]
    impl Camera for FailingCamera {
        fn geometry(&self) -> FrameGeometry {
            self.0
        }

        async fn capture(&mut self, _frame: &mut [u8]) -> Result<(), CameraError> {
            Err(CameraError::Sensor("no vsync".into()))
        }
    }

    #[tokio::test]
    async fn camera_failure_returns_the_rig() {
        let geometry = FrameGeometry::new(4, 4).unwrap();
        let rig = CaptureRig::new(Box::new(FailingCamera(geometry)));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (stream, _) = listener.accept().await.unwrap();
        let _client = client.await.unwrap();

        let settings = StreamSettings {
            frame_interval: Duration::from_millis(1),
            write_timeout: Duration::from_millis(100),
        };
        let (rig, end) = stream_session(stream, rig, settings, None).await;
        assert!(matches!(end, SessionEnd::Camera(_)));
        assert_eq!(rig.geometry(), geometry);
        assert_eq!(rig.frame.len(), geometry.frame_len());
    }

    #[tokio::test]
    async fn idle_session_slot_never_completes() {
        let mut session: Option<JoinHandle<()>> = None;
        let pending = timeout(Duration::from_millis(20), session_finished(&mut session)).await;
        assert!(pending.is_err());
    }
}
