//! ---
//! rovlink_section: "05-transmitter-control-plane"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Camera interface and synthetic test-pattern source."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rovlink_common::VideoConfig;
use rovlink_msg::{FrameGeometry, GeometryError};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("frame buffer holds {actual} bytes, camera produces {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error("sensor failure: {0}")]
    Sensor(String),
}

/// Image sensor producing packed big-endian RGB565 frames.
///
/// `capture` fills the caller's buffer in place and never resizes it.
#[async_trait]
pub trait Camera: Send {
    fn geometry(&self) -> FrameGeometry;

    async fn capture(&mut self, frame: &mut [u8]) -> Result<(), CameraError>;
}

/// RGB565 values for white, yellow, cyan, green, magenta, red, blue, black.
const BARS: [u16; 8] = [
    0xFFFF, 0xFFE0, 0x07FF, 0x07E0, 0xF81F, 0xF800, 0x001F, 0x0000,
];

/// Scrolling colour bars with a little seeded sensor noise.
#[derive(Debug)]
pub struct TestPatternCamera {
    geometry: FrameGeometry,
    exposure: Duration,
    rng: StdRng,
    offset: u16,
    frames: u64,
}

impl TestPatternCamera {
    pub fn new(geometry: FrameGeometry, seed: u64, exposure: Duration) -> Self {
        Self {
            geometry,
            exposure,
            rng: StdRng::seed_from_u64(seed),
            offset: 0,
            frames: 0,
        }
    }

    pub fn from_config(config: &VideoConfig) -> Result<Self, GeometryError> {
        let geometry = FrameGeometry::new(config.width, config.height)?;
        Ok(Self::new(geometry, config.pattern_seed, config.exposure))
    }

    /// Frames captured so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn bar_at(&self, x: u16) -> u16 {
        let width = self.geometry.width() as u32;
        let column = (x as u32 + self.offset as u32) % width;
        BARS[(column * BARS.len() as u32 / width) as usize]
    }
}

#[async_trait]
impl Camera for TestPatternCamera {
    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    async fn capture(&mut self, frame: &mut [u8]) -> Result<(), CameraError> {
        let expected = self.geometry.frame_len();
        if frame.len() != expected {
            return Err(CameraError::BufferSize {
                expected,
                actual: frame.len(),
            });
        }
        if !self.exposure.is_zero() {
            tokio::time::sleep(self.exposure).await;
        }

        let width = self.geometry.width() as usize;
        for (index, pixel) in frame.chunks_exact_mut(2).enumerate() {
            let x = (index % width) as u16;
            // noise only touches the two least significant blue bits
            let noise: u16 = self.rng.gen_range(0..4);
            let value = self.bar_at(x) ^ noise;
            pixel.copy_from_slice(&value.to_be_bytes());
        }

        self.offset = (self.offset + 1) % self.geometry.width();
        self.frames += 1;
        debug!(frame = self.frames, "test pattern captured");
        Ok(())
    }
}
