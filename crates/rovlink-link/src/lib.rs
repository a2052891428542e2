//! ---
//! rovlink_section: "04-link-supervision"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Wireless association supervision and radio abstractions."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
//! Keeps the transmitter's wireless association alive and publishes its state.

pub mod host;
pub mod radio;
pub mod simulated;
pub mod status;
pub mod supervisor;

pub use host::HostNetwork;
pub use radio::{Credentials, LinkError, RadioStatus, StaticIpConfig, WirelessInterface};
pub use simulated::SimulatedRadio;
pub use status::report_link_status;
pub use supervisor::{CheckOutcome, ConnectOutcome, LinkState, WifiSupervisor};
