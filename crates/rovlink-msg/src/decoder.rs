//! ---
//! rovlink_section: "02-wire-protocols"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Resynchronising decoder for the video stream."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, warn};

use crate::video::MARKER;

/// Recoverable framing faults; the decoder rescans for the next marker after each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolFault {
    /// The length field disagrees with the configured frame size.
    #[error("declared length {declared} does not match frame size {expected}")]
    LengthMismatch {
        /// Length read from the wire.
        declared: u16,
        /// Configured frame size.
        expected: u16,
    },
}

impl ProtocolFault {
    /// Short label used for metrics and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            ProtocolFault::LengthMismatch { .. } => "length_mismatch",
        }
    }
}

/// Errors surfaced by [`FrameDecoder`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Framing fault; decoding may continue on the same stream.
    #[error(transparent)]
    Protocol(#[from] ProtocolFault),
    /// The stream ended; the connection has to be re-established.
    #[error("connection lost")]
    ConnectionLost,
    /// Transport failure other than end of stream.
    #[error("video transport error: {0}")]
    Io(io::Error),
}

impl DecodeError {
    fn from_io(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            DecodeError::ConnectionLost
        } else {
            DecodeError::Io(err)
        }
    }

    /// True when the stream is unusable and must be reconnected.
    pub fn is_transport(&self) -> bool {
        !matches!(self, DecodeError::Protocol(_))
    }
}

/// Counters kept across the decoder's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecoderStats {
    /// Complete payloads returned.
    pub frames: u64,
    /// Bytes skipped while seeking a marker.
    pub bytes_discarded: u64,
    /// Marker searches that had to skip at least one byte.
    pub resyncs: u64,
    /// Headers rejected because of their length.
    pub length_mismatches: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    Seeking,
    Reading { declared: u16 },
}

/// Pulls video messages out of a byte stream, resynchronising on the `FR` marker.
///
/// The payload buffer is reused between frames. Reads are not cancellation safe: dropping a
/// pending [`FrameDecoder::read_message`] future loses the bytes it already consumed.
pub struct FrameDecoder<R> {
    reader: BufReader<R>,
    expected: Option<u16>,
    state: DecoderState,
    payload: Vec<u8>,
    stats: DecoderStats,
}

impl<R: AsyncRead + Unpin> FrameDecoder<R> {
    /// Decoder accepting any declared length.
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            expected: None,
            state: DecoderState::Seeking,
            payload: Vec::new(),
            stats: DecoderStats::default(),
        }
    }

    /// Decoder that rejects headers whose length differs from `frame_len`.
    pub fn with_frame_len(reader: R, frame_len: u16) -> Self {
        let mut decoder = Self::new(reader);
        decoder.expected = Some(frame_len);
        decoder.payload.reserve(frame_len as usize);
        decoder
    }

    /// Read the next message and return its payload length.
    ///
    /// The payload is available through [`FrameDecoder::payload`] until the next call.
    pub async fn read_message(&mut self) -> Result<usize, DecodeError> {
        loop {
            match self.state {
                DecoderState::Seeking => {
                    self.seek_marker().await?;
                    let declared = self
                        .reader
                        .read_u16()
                        .await
                        .map_err(DecodeError::from_io)?;
                    if let Some(expected) = self.expected {
                        if declared != expected {
                            self.stats.length_mismatches += 1;
                            return Err(ProtocolFault::LengthMismatch { declared, expected }.into());
                        }
                    }
                    self.state = DecoderState::Reading { declared };
                }
                DecoderState::Reading { declared } => {
                    self.state = DecoderState::Seeking;
                    let len = declared as usize;
                    self.payload.resize(len, 0);
                    self.reader
                        .read_exact(&mut self.payload[..len])
                        .await
                        .map_err(DecodeError::from_io)?;
                    self.stats.frames += 1;
                    return Ok(len);
                }
            }
        }
    }

    /// Read the next frame, skipping over protocol faults.
    pub async fn next_frame(&mut self) -> Result<&[u8], DecodeError> {
        loop {
            match self.read_message().await {
                Ok(len) => return Ok(&self.payload[..len]),
                Err(DecodeError::Protocol(fault)) => {
                    warn!(fault = %fault, "video protocol fault; rescanning for marker");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Payload of the last message returned by [`FrameDecoder::read_message`].
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Lifetime counters.
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    async fn seek_marker(&mut self) -> Result<(), DecodeError> {
        let mut window = [self.read_byte().await?, self.read_byte().await?];
        let mut discarded = 0u64;
        while window != MARKER {
            discarded += 1;
            window = [window[1], self.read_byte().await?];
        }
        if discarded > 0 {
            self.stats.bytes_discarded += discarded;
            self.stats.resyncs += 1;
            debug!(discarded, "resynchronised on video marker");
        }
        Ok(())
    }

    async fn read_byte(&mut self) -> Result<u8, DecodeError> {
        self.reader.read_u8().await.map_err(DecodeError::from_io)
    }
}
