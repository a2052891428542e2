//! ---
//! rovlink_section: "04-link-supervision"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Radio driver interface used by the link supervisor."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::fmt;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use rovlink_common::WifiConfig;

/// Association status as reported by the radio driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadioStatus {
    Idle,
    Connecting,
    NoApFound,
    WrongPassword,
    ConnectFail,
    GotIp,
}

impl RadioStatus {
    /// Statuses after which the driver will not make progress without a fresh association.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RadioStatus::Idle
                | RadioStatus::NoApFound
                | RadioStatus::WrongPassword
                | RadioStatus::ConnectFail
        )
    }
}

impl fmt::Display for RadioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RadioStatus::Idle => "idle",
            RadioStatus::Connecting => "connecting",
            RadioStatus::NoApFound => "no_ap_found",
            RadioStatus::WrongPassword => "wrong_password",
            RadioStatus::ConnectFail => "connect_fail",
            RadioStatus::GotIp => "got_ip",
        };
        f.write_str(label)
    }
}

/// Static addressing applied when the radio is activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticIpConfig {
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Ipv4Addr,
}

impl From<&WifiConfig> for StaticIpConfig {
    fn from(config: &WifiConfig) -> Self {
        Self {
            address: config.address,
            netmask: config.netmask,
            gateway: config.gateway,
            dns: config.dns,
        }
    }
}

/// Network name and passphrase.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
}

impl From<&WifiConfig> for Credentials {
    fn from(config: &WifiConfig) -> Self {
        Self {
            ssid: config.ssid.clone(),
            password: config.password.clone(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("radio is not active")]
    NotActive,
    #[error("radio driver error: {0}")]
    Driver(String),
}

/// Station-mode radio driver.
///
/// Calls return as soon as the driver accepted the request; association progress is observed
/// through [`WirelessInterface::status`].
#[async_trait]
pub trait WirelessInterface: Send + Sync {
    /// Power the radio up in station mode with static addressing.
    async fn activate(&self, ip: &StaticIpConfig) -> Result<(), LinkError>;

    /// Current association status.
    async fn status(&self) -> Result<RadioStatus, LinkError>;

    async fn is_connected(&self) -> Result<bool, LinkError> {
        Ok(self.status().await? == RadioStatus::GotIp)
    }

    /// Start associating with the given network.
    async fn connect(&self, credentials: &Credentials) -> Result<(), LinkError>;

    async fn disconnect(&self) -> Result<(), LinkError>;
}
