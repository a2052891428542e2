//! ---
//! rovlink_section: "05-transmitter-control-plane"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Camera and radio controller services."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
//! The transmitter owns the camera, the wireless link and the transmit side of the serial
//! link. Everything runs as cooperative tasks on one runtime thread.

pub mod camera;
pub mod control;
pub mod runtime;
pub mod serial;
pub mod video;

pub use camera::{Camera, CameraError, TestPatternCamera};
pub use control::{
    ArmQuery, CommandSink, ControlServerBuilder, ControlServerHandle, HttpRequestIntent,
    SinkError, ValidationFault,
};
pub use runtime::{run_transmitter, Transmitter};
pub use serial::{open_serial_writer, SerialCommandSink, SerialWriter, WriterSummary};
pub use video::{CaptureRig, SessionEnd, StreamSettings, VideoStreamHandle, VideoStreamServer};
