//! ---
//! rovlink_section: "07-viewer"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Video stream client with reconnect."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use rovlink_common::{VideoConfig, ViewerConfig};
use rovlink_metrics::ViewerMetrics;
use rovlink_msg::{DecodeError, FrameDecoder, FrameGeometry, GeometryError, RgbImage};
use tokio::net::TcpStream;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::sink::FrameSink;

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("cannot reach video stream: {0}")]
    Connect(#[source] io::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Connects to the video port and feeds decoded frames to a [`FrameSink`].
#[derive(Debug, Clone)]
pub struct ViewerClient {
    addr: SocketAddr,
    geometry: FrameGeometry,
    scale: u32,
    reconnect_delay: Duration,
    metrics: Option<ViewerMetrics>,
}

impl ViewerClient {
    pub fn new(addr: SocketAddr, geometry: FrameGeometry) -> Self {
        Self {
            addr,
            geometry,
            scale: 1,
            reconnect_delay: Duration::from_secs(1),
            metrics: None,
        }
    }

    pub fn from_config(viewer: &ViewerConfig, video: &VideoConfig) -> Result<Self, GeometryError> {
        let geometry = FrameGeometry::new(video.width, video.height)?;
        Ok(Self::new(viewer.video_addr, geometry)
            .with_scale(viewer.scale)
            .with_reconnect_delay(viewer.reconnect_delay))
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale.max(1);
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_metrics(mut self, metrics: ViewerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Stream over a single connection until it fails or `limit` frames were presented.
    pub async fn stream_once<S>(&self, sink: &mut S, limit: Option<u64>) -> Result<u64, ViewerError>
    where
        S: FrameSink + ?Sized,
    {
        let stream = TcpStream::connect(self.addr)
            .await
            .map_err(ViewerError::Connect)?;
        info!(address = %self.addr, "connected to video stream");
        if let Some(metrics) = &self.metrics {
            metrics.inc_connection();
        }

        let mut decoder = FrameDecoder::with_frame_len(stream, self.geometry.length_field());
        let mut presented = 0u64;
        let mut discarded = 0u64;
        while limit.map_or(true, |limit| presented < limit) {
            let outcome = decoder.read_message().await;
            let stats = decoder.stats();
            if let Some(metrics) = &self.metrics {
                metrics.add_discarded(stats.bytes_discarded - discarded);
            }
            discarded = stats.bytes_discarded;

            match outcome {
                Ok(_) => {
                    let image = RgbImage::from_rgb565(self.geometry, decoder.payload())?
                        .upscale(self.scale);
                    if let Err(err) = sink.present(&image).await {
                        warn!(error = %err, "frame sink failed");
                    }
                    presented += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_frame();
                    }
                }
                Err(DecodeError::Protocol(fault)) => {
                    warn!(fault = %fault, "video protocol fault; resynchronising");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_protocol_fault(fault.label());
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(presented)
    }

    /// Stream forever, reconnecting after `reconnect_delay` whenever the connection is lost.
    pub async fn run<S>(&self, sink: &mut S)
    where
        S: FrameSink + ?Sized,
    {
        loop {
            match self.stream_once(sink, None).await {
                Ok(frames) => info!(frames, "video stream ended"),
                Err(err) => warn!(error = %err, delay = ?self.reconnect_delay, "video stream lost; reconnecting"),
            }
            sleep(self.reconnect_delay).await;
        }
    }
}
