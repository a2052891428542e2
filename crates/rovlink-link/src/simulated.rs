//! ---
//! rovlink_section: "04-link-supervision"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Scripted radio used in simulation mode and tests."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::radio::{Credentials, LinkError, RadioStatus, StaticIpConfig, WirelessInterface};

#[derive(Debug)]
struct Pending {
    polls_left: u32,
    outcome: RadioStatus,
}

#[derive(Debug, Default)]
struct RadioInner {
    active: bool,
    ip: Option<StaticIpConfig>,
    associated: bool,
    pending: Option<Pending>,
    failures: VecDeque<RadioStatus>,
    connect_calls: u64,
    disconnect_calls: u64,
    status_reads: u64,
}

/// In-memory radio that associates after a configurable number of polls.
///
/// Queued failure statuses are consumed one per association request; once the queue is empty
/// every request succeeds.
#[derive(Debug)]
pub struct SimulatedRadio {
    ssid: String,
    polls_to_associate: u32,
    inner: Mutex<RadioInner>,
}

impl SimulatedRadio {
    pub fn new(ssid: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            polls_to_associate: 1,
            inner: Mutex::new(RadioInner::default()),
        }
    }

    /// Status polls spent in `Connecting` before an association resolves.
    pub fn with_polls_to_associate(mut self, polls: u32) -> Self {
        self.polls_to_associate = polls;
        self
    }

    /// Queue failure statuses for the next association requests.
    pub fn with_failures<I>(self, failures: I) -> Self
    where
        I: IntoIterator<Item = RadioStatus>,
    {
        self.inner.lock().failures.extend(failures);
        self
    }

    /// Simulate the access point going away.
    pub fn drop_link(&self) {
        let mut inner = self.inner.lock();
        inner.associated = false;
        inner.pending = None;
        info!(ssid = %self.ssid, "simulated access point lost");
    }

    /// Association requests received.
    pub fn connect_calls(&self) -> u64 {
        self.inner.lock().connect_calls
    }

    pub fn disconnect_calls(&self) -> u64 {
        self.inner.lock().disconnect_calls
    }

    pub fn status_reads(&self) -> u64 {
        self.inner.lock().status_reads
    }

    /// Addressing applied by the last activation.
    pub fn applied_ip(&self) -> Option<StaticIpConfig> {
        self.inner.lock().ip
    }
}

#[async_trait]
impl WirelessInterface for SimulatedRadio {
    async fn activate(&self, ip: &StaticIpConfig) -> Result<(), LinkError> {
        let mut inner = self.inner.lock();
        inner.active = true;
        inner.ip = Some(*ip);
        Ok(())
    }

    async fn status(&self) -> Result<RadioStatus, LinkError> {
        let mut inner = self.inner.lock();
        inner.status_reads += 1;
        if inner.associated {
            return Ok(RadioStatus::GotIp);
        }
        let Some(pending) = inner.pending.as_mut() else {
            return Ok(RadioStatus::Idle);
        };
        if pending.polls_left > 0 {
            pending.polls_left -= 1;
            return Ok(RadioStatus::Connecting);
        }
        let outcome = pending.outcome;
        if outcome == RadioStatus::GotIp {
            inner.associated = true;
            inner.pending = None;
        }
        Ok(outcome)
    }

    async fn connect(&self, credentials: &Credentials) -> Result<(), LinkError> {
        let mut inner = self.inner.lock();
        if !inner.active {
            return Err(LinkError::NotActive);
        }
        inner.connect_calls += 1;
        let outcome = if credentials.ssid != self.ssid {
            RadioStatus::NoApFound
        } else {
            inner.failures.pop_front().unwrap_or(RadioStatus::GotIp)
        };
        debug!(ssid = %credentials.ssid, %outcome, "simulated association requested");
        inner.associated = false;
        inner.pending = Some(Pending {
            polls_left: self.polls_to_associate,
            outcome,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        let mut inner = self.inner.lock();
        inner.disconnect_calls += 1;
        inner.associated = false;
        inner.pending = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip() -> StaticIpConfig {
        StaticIpConfig {
            address: Ipv4Addr::new(192, 168, 197, 208),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 197, 1),
            dns: Ipv4Addr::new(8, 8, 8, 8),
        }
    }

    fn credentials(ssid: &str) -> Credentials {
        Credentials {
            ssid: ssid.into(),
            password: "secret".into(),
        }
    }

    #[tokio::test]
    async fn refuses_association_before_activation() {
        let radio = SimulatedRadio::new("rover");
        assert!(matches!(
            radio.connect(&credentials("rover")).await,
            Err(LinkError::NotActive)
        ));
    }

    #[tokio::test]
    async fn associates_after_configured_polls() {
        let radio = SimulatedRadio::new("rover").with_polls_to_associate(2);
        radio.activate(&ip()).await.unwrap();
        radio.connect(&credentials("rover")).await.unwrap();
        assert_eq!(radio.status().await.unwrap(), RadioStatus::Connecting);
        assert_eq!(radio.status().await.unwrap(), RadioStatus::Connecting);
        assert_eq!(radio.status().await.unwrap(), RadioStatus::GotIp);
        assert!(radio.is_connected().await.unwrap());
        assert_eq!(radio.applied_ip(), Some(ip()));
    }

    #[tokio::test]
    async fn unknown_network_reports_no_ap() {
        let radio = SimulatedRadio::new("rover").with_polls_to_associate(0);
        radio.activate(&ip()).await.unwrap();
        radio.connect(&credentials("elsewhere")).await.unwrap();
        assert_eq!(radio.status().await.unwrap(), RadioStatus::NoApFound);
        assert_eq!(radio.status().await.unwrap(), RadioStatus::NoApFound);
    }
}
