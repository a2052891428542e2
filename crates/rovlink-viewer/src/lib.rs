//! ---
//! rovlink_section: "07-viewer"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Video viewer client and frame sinks."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---

pub mod client;
pub mod sink;

use std::future::Future;

use anyhow::{Context, Result};
use rovlink_common::AppConfig;
use rovlink_metrics::{prometheus::Registry, ViewerMetrics};
use tracing::info;

pub use client::{ViewerClient, ViewerError};
pub use sink::{encode_ppm, FrameSink, FrameSinkError, LogSink, PpmSnapshotSink};

/// Run the viewer until `shutdown` resolves.
///
/// Frames go to a PPM snapshot when `viewer.snapshot` is set, otherwise to the log.
pub async fn run_viewer<F>(config: &AppConfig, registry: &Registry, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let metrics = ViewerMetrics::new(registry).context("registering viewer metrics")?;
    let client = ViewerClient::from_config(&config.viewer, &config.video)
        .context("video geometry")?
        .with_metrics(metrics);

    let mut sink: Box<dyn FrameSink> = match &config.viewer.snapshot {
        Some(path) => {
            info!(path = %path.display(), "writing snapshots");
            Box::new(PpmSnapshotSink::new(path))
        }
        None => Box::new(LogSink::default()),
    };

    tokio::select! {
        _ = client.run(sink.as_mut()) => {}
        _ = shutdown => info!("shutdown requested"),
    }
    info!("viewer stopped");
    Ok(())
}
