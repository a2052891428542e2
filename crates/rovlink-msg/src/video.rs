//! ---
//! rovlink_section: "02-wire-protocols"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Frame geometry and video message encoding."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use bytes::BufMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Two-byte marker opening every video message.
pub const MARKER: [u8; 2] = *b"FR";

/// Marker plus the big-endian length field.
pub const HEADER_LEN: usize = 4;

/// Bytes per RGB565 pixel.
const BYTES_PER_PIXEL: usize = 2;

/// Errors raised while validating frame dimensions or payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    /// Width or height is zero.
    #[error("frame geometry {width}x{height} has no pixels")]
    Empty {
        /// Requested width.
        width: u16,
        /// Requested height.
        height: u16,
    },
    /// The frame byte count cannot be expressed in the 16-bit length field.
    #[error("frame of {bytes} bytes does not fit the 16-bit length field")]
    TooLarge {
        /// Frame size in bytes.
        bytes: usize,
    },
    /// A payload of the wrong size was supplied for this geometry.
    #[error("payload holds {actual} bytes, frame requires {expected}")]
    PayloadLength {
        /// Bytes required by the geometry.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },
}

/// Dimensions of the RGB565 frame produced by the camera.
///
/// The frame length is fixed for the process lifetime and always fits the wire length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    width: u16,
    height: u16,
}

impl FrameGeometry {
    /// Validate and build a geometry.
    pub fn new(width: u16, height: u16) -> Result<Self, GeometryError> {
        if width == 0 || height == 0 {
            return Err(GeometryError::Empty { width, height });
        }
        let bytes = width as usize * height as usize * BYTES_PER_PIXEL;
        if bytes > u16::MAX as usize {
            return Err(GeometryError::TooLarge { bytes });
        }
        Ok(Self { width, height })
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Number of pixels per frame.
    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Frame size in bytes.
    pub fn frame_len(&self) -> usize {
        self.pixels() * BYTES_PER_PIXEL
    }

    /// Frame size as carried in the length field.
    pub fn length_field(&self) -> u16 {
        // bounded by `new`
        self.frame_len() as u16
    }

    /// Allocate the zeroed frame buffer for this geometry.
    pub fn allocate(&self) -> Vec<u8> {
        vec![0; self.frame_len()]
    }
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self {
            width: 80,
            height: 60,
        }
    }
}

/// Borrowed view of one video message ready to be written to the stream.
#[derive(Debug, Clone, Copy)]
pub struct VideoMessage<'a> {
    payload: &'a [u8],
}

impl<'a> VideoMessage<'a> {
    /// Wrap a payload, rejecting one that cannot be described by the length field.
    pub fn new(payload: &'a [u8]) -> Result<Self, GeometryError> {
        if payload.len() > u16::MAX as usize {
            return Err(GeometryError::TooLarge {
                bytes: payload.len(),
            });
        }
        Ok(Self { payload })
    }

    /// Raw frame bytes.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Value of the length field; always equals the payload length.
    pub fn declared_len(&self) -> u16 {
        self.payload.len() as u16
    }

    /// Marker and big-endian length.
    pub fn header(&self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        let mut cursor = &mut header[..];
        cursor.put_slice(&MARKER);
        cursor.put_u16(self.declared_len());
        header
    }

    /// Append the complete message to `dst`.
    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_slice(&self.header());
        dst.put_slice(self.payload);
    }

    /// Write header and payload, then flush.
    pub async fn write_to<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.header()).await?;
        writer.write_all(self.payload).await?;
        writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry_is_9600_bytes() {
        let geometry = FrameGeometry::default();
        assert_eq!(geometry.frame_len(), 9600);
        assert_eq!(FrameGeometry::new(80, 60).unwrap(), geometry);
    }

    #[test]
    fn rejects_geometry_overflowing_length_field() {
        assert_eq!(
            FrameGeometry::new(256, 128),
            Err(GeometryError::TooLarge { bytes: 65536 })
        );
        assert!(matches!(
            FrameGeometry::new(0, 60),
            Err(GeometryError::Empty { .. })
        ));
        assert!(FrameGeometry::new(255, 128).is_ok());
    }

    #[test]
    fn header_carries_marker_and_big_endian_length() {
        let payload = vec![0xAB; 0x0102];
        let message = VideoMessage::new(&payload).unwrap();
        assert_eq!(message.header(), [b'F', b'R', 0x01, 0x02]);

        let mut wire = Vec::new();
        message.encode(&mut wire);
        assert_eq!(wire.len(), HEADER_LEN + payload.len());
        assert_eq!(&wire[HEADER_LEN..], &payload[..]);
    }
}
