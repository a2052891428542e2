//! ---
//! rovlink_section: "05-transmitter-control-plane"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Transmitter process wiring: link, control endpoint, video stream."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rovlink_common::AppConfig;
use rovlink_link::{report_link_status, HostNetwork, SimulatedRadio, WifiSupervisor, WirelessInterface};
use rovlink_metrics::{prometheus::Registry, TransmitterMetrics};
use tracing::{info, warn};

use crate::camera::TestPatternCamera;
use crate::control::{ControlServerBuilder, ControlServerHandle};
use crate::serial::SerialCommandSink;
use crate::video::{CaptureRig, StreamSettings, VideoStreamHandle, VideoStreamServer};

/// Running transmitter services.
pub struct Transmitter {
    supervisor: Arc<WifiSupervisor>,
    control: ControlServerHandle,
    video: VideoStreamHandle,
    background: Vec<tokio::task::JoinHandle<()>>,
}

impl Transmitter {
    /// Bring the link up, then start the control endpoint and video stream.
    ///
    /// Startup fails only for configuration problems: an unusable geometry, a listener that
    /// cannot bind or a serial endpoint that cannot be opened.
    pub async fn start(config: &AppConfig, registry: &Registry) -> Result<Self> {
        let metrics = TransmitterMetrics::new(registry).context("registering transmitter metrics")?;

        let radio: Arc<dyn WirelessInterface> = if config.mode.is_simulation() {
            Arc::new(SimulatedRadio::new(config.wifi.ssid.clone()))
        } else {
            Arc::new(HostNetwork)
        };
        let supervisor = Arc::new(
            WifiSupervisor::from_config(radio, &config.wifi).with_metrics(metrics.clone()),
        );
        let mut background = vec![tokio::spawn({
            let states = supervisor.subscribe();
            async move {
                report_link_status(states).await;
            }
        })];

        supervisor.connect_blocking().await;
        background.push(tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.watchdog_loop().await }
        }));

        let (sink, writer) = SerialCommandSink::open(
            config.serial.endpoint.clone(),
            config.control.command_queue,
            Some(metrics.clone()),
        )
        .await
        .with_context(|| format!("opening serial endpoint {}", config.serial.endpoint))?;
        background.push(tokio::spawn(async move {
            if let Err(err) = writer.await {
                warn!(error = %err, "serial writer task failed");
            }
        }));

        let control = ControlServerBuilder::new(config.control.listen, Arc::new(sink))
            .with_metrics(metrics.clone())
            .spawn()
            .await
            .with_context(|| format!("binding control endpoint {}", config.control.listen))?;

        let camera = TestPatternCamera::from_config(&config.video).context("video geometry")?;
        let video = VideoStreamServer::bind(
            config.video.listen,
            CaptureRig::new(Box::new(camera)),
            StreamSettings::from(&config.video),
        )
        .await
        .with_context(|| format!("binding video stream {}", config.video.listen))?
        .with_metrics(metrics)
        .spawn()?;

        info!(
            control = %control.local_addr(),
            video = %video.local_addr(),
            mode = ?config.mode,
            "transmitter ready"
        );
        Ok(Self {
            supervisor,
            control,
            video,
            background,
        })
    }

    pub fn control_addr(&self) -> SocketAddr {
        self.control.local_addr()
    }

    pub fn video_addr(&self) -> SocketAddr {
        self.video.local_addr()
    }

    pub fn supervisor(&self) -> &Arc<WifiSupervisor> {
        &self.supervisor
    }

    pub async fn shutdown(self) -> Result<()> {
        for task in &self.background {
            task.abort();
        }
        self.video.shutdown().await?;
        self.control.shutdown().await?;
        info!("transmitter stopped");
        Ok(())
    }
}

/// Run the transmitter until `shutdown` resolves.
pub async fn run_transmitter<F>(config: &AppConfig, registry: &Registry, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let transmitter = Transmitter::start(config, registry).await?;
    shutdown.await;
    info!("shutdown requested");
    transmitter.shutdown().await
}
