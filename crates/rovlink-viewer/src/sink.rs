//! ---
//! rovlink_section: "07-viewer"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Display sinks for decoded frames."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rovlink_msg::RgbImage;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum FrameSinkError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Receives every decoded frame.
#[async_trait]
pub trait FrameSink: Send {
    async fn present(&mut self, image: &RgbImage) -> Result<(), FrameSinkError>;
}

/// Keeps the latest frame on disk as a binary PPM.
///
/// Each frame is written next to the target and renamed over it, so readers never observe a
/// partial image.
#[derive(Debug)]
pub struct PpmSnapshotSink {
    path: PathBuf,
    staging: PathBuf,
    written: u64,
}

impl PpmSnapshotSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut staging: OsString = path.clone().into_os_string();
        staging.push(".tmp");
        Self {
            path,
            staging: PathBuf::from(staging),
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

/// Encode an image as binary PPM (`P6`).
pub fn encode_ppm(image: &RgbImage) -> Vec<u8> {
    let header = format!("P6\n{} {}\n255\n", image.width(), image.height());
    let mut out = Vec::with_capacity(header.len() + image.as_bytes().len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(image.as_bytes());
    out
}

#[async_trait]
impl FrameSink for PpmSnapshotSink {
    async fn present(&mut self, image: &RgbImage) -> Result<(), FrameSinkError> {
        let bytes = encode_ppm(image);
        tokio::fs::write(&self.staging, &bytes)
            .await
            .map_err(|source| FrameSinkError::Write {
                path: self.staging.clone(),
                source,
            })?;
        tokio::fs::rename(&self.staging, &self.path)
            .await
            .map_err(|source| FrameSinkError::Write {
                path: self.path.clone(),
                source,
            })?;
        self.written += 1;
        debug!(path = %self.path.display(), frame = self.written, "snapshot updated");
        Ok(())
    }
}

/// Logs frame statistics every `every` frames.
#[derive(Debug)]
pub struct LogSink {
    every: u64,
    seen: u64,
}

impl LogSink {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            seen: 0,
        }
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(50)
    }
}

#[async_trait]
impl FrameSink for LogSink {
    async fn present(&mut self, image: &RgbImage) -> Result<(), FrameSinkError> {
        self.seen += 1;
        if self.seen % self.every == 1 || self.every == 1 {
            let [r, g, b] = image.mean_rgb();
            info!(
                frame = self.seen,
                width = image.width(),
                height = image.height(),
                mean_r = r,
                mean_g = g,
                mean_b = b,
                "frame received"
            );
        }
        Ok(())
    }
}
