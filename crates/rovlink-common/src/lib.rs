//! ---
//! rovlink_section: "01-core-functionality"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Shared primitives and utilities for the control plane processes."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
//! Core shared primitives for the rovlink workspace.
//! This crate exposes configuration loading and logging utilities consumed by the
//! transmitter, receiver and viewer processes.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, ControlConfig, LoadedAppConfig, LoggingConfig, MetricsConfig, Mode,
    ReceiverConfig, SerialConfig, SerialEndpoint, VideoConfig, ViewerConfig, WifiConfig,
};
pub use logging::{init_tracing, LogFormat};
