//! ---
//! rovlink_section: "01-core-functionality"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Shared primitives and utilities for the control plane processes."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_mode() -> Mode {
    Mode::Production
}

fn default_wifi_address() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 197, 208)
}

fn default_wifi_netmask() -> Ipv4Addr {
    Ipv4Addr::new(255, 255, 255, 0)
}

fn default_wifi_gateway() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 197, 1)
}

fn default_wifi_dns() -> Ipv4Addr {
    Ipv4Addr::new(8, 8, 8, 8)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_watchdog_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_control_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 80))
}

fn default_command_queue() -> usize {
    32
}

fn default_video_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 12345))
}

fn default_frame_width() -> u16 {
    80
}

fn default_frame_height() -> u16 {
    60
}

fn default_frame_interval() -> Duration {
    Duration::from_millis(20)
}

fn default_write_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_exposure() -> Duration {
    Duration::from_millis(10)
}

fn default_pattern_seed() -> u64 {
    0x7670_u64
}

fn default_serial_device() -> PathBuf {
    PathBuf::from("/dev/serial0")
}

fn default_idle_timeout() -> Duration {
    Duration::from_millis(50)
}

fn default_inter_byte_timeout() -> Duration {
    Duration::from_millis(5)
}

fn default_max_line_len() -> usize {
    256
}

fn default_reopen_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_time_scale() -> f32 {
    1.0
}

fn default_viewer_video_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 12345))
}

fn default_viewer_scale() -> u32 {
    4
}

fn default_reconnect_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_file_logging() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9898))
}

/// Primary configuration object shared by the transmitter, receiver and viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_mode")]
    pub mode: Mode,
    #[serde(default)]
    pub wifi: WifiConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub receiver: ReceiverConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "ROVLINK_CONFIG";

    /// Load configuration from disk, respecting the `ROVLINK_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path.to_path_buf(),
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.wifi.validate()?;
        self.video.validate()?;
        self.serial.validate()?;
        self.receiver.validate()?;
        self.viewer.validate()?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            wifi: WifiConfig::default(),
            control: ControlConfig::default(),
            video: VideoConfig::default(),
            serial: SerialConfig::default(),
            receiver: ReceiverConfig::default(),
            viewer: ViewerConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Operating mode. Simulation replaces the OS-managed network link with a simulated radio.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Production,
    Simulation,
}

impl Mode {
    pub fn is_simulation(&self) -> bool {
        matches!(self, Mode::Simulation)
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Mode::Production),
            "simulation" => Ok(Mode::Simulation),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Fixed association parameters; the robot has no way to reconfigure them at runtime.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiConfig {
    #[serde(default)]
    pub ssid: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_wifi_address")]
    pub address: Ipv4Addr,
    #[serde(default = "default_wifi_netmask")]
    pub netmask: Ipv4Addr,
    #[serde(default = "default_wifi_gateway")]
    pub gateway: Ipv4Addr,
    #[serde(default = "default_wifi_dns")]
    pub dns: Ipv4Addr,
    #[serde(default = "default_poll_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,
    #[serde(default = "default_watchdog_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub watchdog_interval: Duration,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            address: default_wifi_address(),
            netmask: default_wifi_netmask(),
            gateway: default_wifi_gateway(),
            dns: default_wifi_dns(),
            poll_interval: default_poll_interval(),
            watchdog_interval: default_watchdog_interval(),
        }
    }
}

impl WifiConfig {
    pub fn validate(&self) -> Result<()> {
        // status must be sampled at least once per second while associating
        if self.poll_interval.is_zero() || self.poll_interval > Duration::from_secs(1) {
            return Err(anyhow!(
                "wifi.poll_interval must be within (0, 1000] ms, got {} ms",
                self.poll_interval.as_millis()
            ));
        }
        if self.watchdog_interval.is_zero() {
            return Err(anyhow!("wifi.watchdog_interval must be non-zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_control_listen")]
    pub listen: SocketAddr,
    /// Capacity of the queue feeding the serial writer.
    #[serde(default = "default_command_queue")]
    pub command_queue: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            listen: default_control_listen(),
            command_queue: default_command_queue(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    #[serde(default = "default_video_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_frame_width")]
    pub width: u16,
    #[serde(default = "default_frame_height")]
    pub height: u16,
    #[serde(default = "default_frame_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub frame_interval: Duration,
    #[serde(default = "default_write_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub write_timeout: Duration,
    /// Simulated exposure time of the test-pattern camera.
    #[serde(default = "default_exposure")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub exposure: Duration,
    #[serde(default = "default_pattern_seed")]
    pub pattern_seed: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            listen: default_video_listen(),
            width: default_frame_width(),
            height: default_frame_height(),
            frame_interval: default_frame_interval(),
            write_timeout: default_write_timeout(),
            exposure: default_exposure(),
            pattern_seed: default_pattern_seed(),
        }
    }
}

impl VideoConfig {
    /// Size in bytes of one RGB565 frame at the configured resolution.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 2
    }

    pub fn validate(&self) -> Result<()> {
        let len = self.frame_len();
        if len == 0 {
            return Err(anyhow!("video resolution must be non-zero"));
        }
        if len > u16::MAX as usize {
            return Err(anyhow!(
                "video frame of {}x{} ({} bytes) does not fit the 16-bit length field",
                self.width,
                self.height,
                len
            ));
        }
        if self.frame_interval.is_zero() {
            return Err(anyhow!("video.frame_interval must be non-zero"));
        }
        if self.write_timeout.is_zero() {
            return Err(anyhow!("video.write_timeout must be non-zero"));
        }
        Ok(())
    }
}

/// Where the serial command link lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SerialEndpoint {
    /// A tty device, configured externally (115200 8N1).
    Device { path: PathBuf },
    /// TCP bridge: the transmitter connects, the receiver listens.
    Tcp { address: SocketAddr },
}

impl Default for SerialEndpoint {
    fn default() -> Self {
        SerialEndpoint::Device {
            path: default_serial_device(),
        }
    }
}

impl std::fmt::Display for SerialEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerialEndpoint::Device { path } => write!(f, "device:{}", path.display()),
            SerialEndpoint::Tcp { address } => write!(f, "tcp:{}", address),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    #[serde(default)]
    pub endpoint: SerialEndpoint,
    /// Wait for the first byte of a line before reporting an idle poll.
    #[serde(default = "default_idle_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub idle_timeout: Duration,
    /// Maximum gap between two bytes of the same line.
    #[serde(default = "default_inter_byte_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub inter_byte_timeout: Duration,
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            endpoint: SerialEndpoint::default(),
            idle_timeout: default_idle_timeout(),
            inter_byte_timeout: default_inter_byte_timeout(),
            max_line_len: default_max_line_len(),
        }
    }
}

impl SerialConfig {
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout.is_zero() || self.inter_byte_timeout.is_zero() {
            return Err(anyhow!("serial timeouts must be non-zero"));
        }
        if self.max_line_len < 16 {
            return Err(anyhow!(
                "serial.max_line_len must be at least 16 bytes, got {}",
                self.max_line_len
            ));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Delay before reopening the serial endpoint after a transport fault.
    #[serde(default = "default_reopen_delay")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub reopen_delay: Duration,
    /// Multiplier applied to simulated motion durations.
    #[serde(default = "default_time_scale")]
    pub time_scale: f32,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            reopen_delay: default_reopen_delay(),
            time_scale: default_time_scale(),
        }
    }
}

impl ReceiverConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.time_scale.is_finite() || self.time_scale < 0.0 {
            return Err(anyhow!(
                "receiver.time_scale must be a finite, non-negative number"
            ));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default = "default_viewer_video_addr")]
    pub video_addr: SocketAddr,
    /// Integer upscale factor applied before presenting a frame.
    #[serde(default = "default_viewer_scale")]
    pub scale: u32,
    #[serde(default = "default_reconnect_delay")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub reconnect_delay: Duration,
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            video_addr: default_viewer_video_addr(),
            scale: default_viewer_scale(),
            reconnect_delay: default_reconnect_delay(),
            snapshot: None,
        }
    }
}

impl ViewerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scale == 0 || self.scale > 16 {
            return Err(anyhow!(
                "viewer.scale must be within 1..=16, got {}",
                self.scale
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Disable on targets without writable storage.
    #[serde(default = "default_file_logging")]
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            file: default_file_logging(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.video.frame_len(), 9600);
        assert_eq!(config.control.listen.port(), 80);
        assert_eq!(config.video.listen.port(), 12345);
    }

    #[test]
    fn parses_tcp_serial_endpoint_and_durations() {
        let config = AppConfig::from_str(
            r#"
mode = "simulation"

[wifi]
ssid = "robot-net"
password = "hunter22"
poll_interval = 500

[serial]
idle_timeout = 40

[serial.endpoint]
kind = "tcp"
address = "127.0.0.1:7000"
"#,
        )
        .expect("config parses");

        assert!(config.mode.is_simulation());
        assert_eq!(config.wifi.ssid, "robot-net");
        assert_eq!(config.wifi.poll_interval, Duration::from_millis(500));
        assert_eq!(config.serial.idle_timeout, Duration::from_millis(40));
        assert_eq!(
            config.serial.endpoint,
            SerialEndpoint::Tcp {
                address: "127.0.0.1:7000".parse().unwrap()
            }
        );
    }

    #[test]
    fn rejects_frames_that_overflow_the_length_field() {
        let err = AppConfig::from_str(
            r#"
[video]
width = 320
height = 240
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("16-bit length field"));
    }

    #[test]
    fn rejects_slow_wifi_polling() {
        let err = AppConfig::from_str(
            r#"
[wifi]
poll_interval = 5000
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("poll_interval"));
    }

    #[test]
    fn load_prefers_first_existing_candidate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing.toml");
        let present = dir.path().join("rovlink.toml");
        fs::write(&present, "[viewer]\nscale = 2\n").expect("write config");

        let loaded = AppConfig::load_with_source(&[missing, present.clone()]).expect("loads");
        assert_eq!(loaded.source, present);
        assert_eq!(loaded.config.viewer.scale, 2);
    }
}
