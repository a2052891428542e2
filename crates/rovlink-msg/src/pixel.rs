//! ---
//! rovlink_section: "02-wire-protocols"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "RGB565 to RGB888 conversion and display scaling."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use crate::video::{FrameGeometry, GeometryError};

/// Convert one big-endian RGB565 pixel to left-aligned RGB888.
#[inline]
pub fn rgb565_to_rgb888(hi: u8, lo: u8) -> [u8; 3] {
    let r = hi & 0xF8;
    let g = ((hi & 0x07) << 5) | ((lo & 0xE0) >> 3);
    let b = (lo & 0x1F) << 3;
    [r, g, b]
}

/// Packed RGB888 image, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RgbImage {
    /// Convert a raw RGB565 frame.
    pub fn from_rgb565(geometry: FrameGeometry, payload: &[u8]) -> Result<Self, GeometryError> {
        if payload.len() != geometry.frame_len() {
            return Err(GeometryError::PayloadLength {
                expected: geometry.frame_len(),
                actual: payload.len(),
            });
        }
        let mut data = Vec::with_capacity(geometry.pixels() * 3);
        for pair in payload.chunks_exact(2) {
            data.extend_from_slice(&rgb565_to_rgb888(pair[0], pair[1]));
        }
        Ok(Self {
            width: geometry.width() as u32,
            height: geometry.height() as u32,
            data,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Packed RGB bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Pixel at `(x, y)`, if inside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y * self.width + x) * 3) as usize;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }

    /// Mean of each channel, used for frame statistics.
    pub fn mean_rgb(&self) -> [f32; 3] {
        let mut sums = [0u64; 3];
        for px in self.data.chunks_exact(3) {
            sums[0] += px[0] as u64;
            sums[1] += px[1] as u64;
            sums[2] += px[2] as u64;
        }
        let count = (self.data.len() / 3).max(1) as f32;
        [
            sums[0] as f32 / count,
            sums[1] as f32 / count,
            sums[2] as f32 / count,
        ]
    }

    /// Nearest-neighbour integer upscale. A factor of 0 or 1 returns a copy.
    pub fn upscale(&self, factor: u32) -> RgbImage {
        if factor <= 1 {
            return self.clone();
        }
        let width = self.width * factor;
        let height = self.height * factor;
        let src_row = self.width as usize * 3;
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for row in self.data.chunks_exact(src_row) {
            let start = data.len();
            for px in row.chunks_exact(3) {
                for _ in 0..factor {
                    data.extend_from_slice(px);
                }
            }
            let end = data.len();
            for _ in 1..factor {
                data.extend_from_within(start..end);
            }
        }
        RgbImage {
            width,
            height,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_colours_are_left_aligned() {
        assert_eq!(rgb565_to_rgb888(0xF8, 0x00), [0xF8, 0x00, 0x00]);
        assert_eq!(rgb565_to_rgb888(0x07, 0xE0), [0x00, 0xFC, 0x00]);
        assert_eq!(rgb565_to_rgb888(0x00, 0x1F), [0x00, 0x00, 0xF8]);
        assert_eq!(rgb565_to_rgb888(0xFF, 0xFF), [0xF8, 0xFC, 0xF8]);
    }

    #[test]
    fn converts_frame_in_row_major_order() {
        let geometry = FrameGeometry::new(2, 1).unwrap();
        let image = RgbImage::from_rgb565(geometry, &[0xF8, 0x00, 0x00, 0x1F]).unwrap();
        assert_eq!(image.as_bytes(), &[0xF8, 0, 0, 0, 0, 0xF8]);
        assert_eq!(image.pixel(1, 0), Some([0, 0, 0xF8]));
        assert_eq!(image.pixel(2, 0), None);
    }

    #[test]
    fn rejects_payload_of_wrong_size() {
        let geometry = FrameGeometry::new(2, 2).unwrap();
        assert_eq!(
            RgbImage::from_rgb565(geometry, &[0; 6]),
            Err(GeometryError::PayloadLength {
                expected: 8,
                actual: 6
            })
        );
    }

    #[test]
    fn upscale_replicates_pixels() {
        let geometry = FrameGeometry::new(2, 1).unwrap();
        let image = RgbImage::from_rgb565(geometry, &[0xF8, 0x00, 0x00, 0x1F]).unwrap();
        let big = image.upscale(3);
        assert_eq!((big.width(), big.height()), (6, 3));
        assert_eq!(big.as_bytes().len(), 6 * 3 * 3);
        for y in 0..3 {
            assert_eq!(big.pixel(2, y), Some([0xF8, 0, 0]));
            assert_eq!(big.pixel(3, y), Some([0, 0, 0xF8]));
        }
    }
}
