//! ---
//! rovlink_section: "02-wire-protocols"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Video framing, pixel conversion and serial command protocol."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Wire protocols shared by the transmitter, receiver and viewer.
//!
//! Two protocols live here: the length-prefixed video stream (`"FR" | u16 BE | payload`) and
//! the newline-terminated command lines carried over the serial link.

pub mod channel;
pub mod command;
pub mod decoder;
pub mod pixel;
pub mod video;

use std::time::Duration;

/// Fault on a byte transport (TCP socket or serial line) that ends the affected session only.
#[derive(Debug, thiserror::Error)]
pub enum TransportFault {
    /// The peer closed the connection.
    #[error("peer closed the connection")]
    PeerClosed,
    /// A write did not drain within the configured deadline.
    #[error("write did not drain within {0:?}")]
    WriteStalled(Duration),
    /// Any other I/O failure.
    #[error("transport io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportFault {
    /// Short label used for metrics and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            TransportFault::PeerClosed => "peer_closed",
            TransportFault::WriteStalled(_) => "write_stalled",
            TransportFault::Io(_) => "io",
        }
    }
}

pub use channel::{ChannelError, CommandWriter, LineReceiver, LineTimeouts, ReceivedLine};
pub use command::{
    parse_line, ArmCommand, Command, CommandLine, CommandLineError, MalformedCommand,
    MoveCommand, ARM_TRANSITION,
};
pub use decoder::{DecodeError, DecoderStats, FrameDecoder, ProtocolFault};
pub use pixel::{rgb565_to_rgb888, RgbImage};
pub use video::{FrameGeometry, GeometryError, VideoMessage, HEADER_LEN, MARKER};
