//! ---
//! rovlink_section: "04-link-supervision"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Radio backed by the host operating system's network stack."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use async_trait::async_trait;
use tracing::{debug, info};

use crate::radio::{Credentials, LinkError, RadioStatus, StaticIpConfig, WirelessInterface};

/// Radio for hosts whose operating system owns the wireless association.
///
/// The link is always reported as up; addressing and roaming are left to the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostNetwork;

#[async_trait]
impl WirelessInterface for HostNetwork {
    async fn activate(&self, ip: &StaticIpConfig) -> Result<(), LinkError> {
        info!(
            address = %ip.address,
            gateway = %ip.gateway,
            "host network manages addressing; static configuration is advisory"
        );
        Ok(())
    }

    async fn status(&self) -> Result<RadioStatus, LinkError> {
        Ok(RadioStatus::GotIp)
    }

    async fn connect(&self, credentials: &Credentials) -> Result<(), LinkError> {
        debug!(ssid = %credentials.ssid, "association delegated to host network");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        Ok(())
    }
}
