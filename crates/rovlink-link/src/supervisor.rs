//! ---
//! rovlink_section: "04-link-supervision"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Wi-Fi association supervisor and watchdog."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rovlink_common::WifiConfig;
use rovlink_metrics::TransmitterMetrics;
use tokio::sync::watch;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::radio::{Credentials, StaticIpConfig, WirelessInterface};

/// Link state published to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

impl LinkState {
    /// Gauge value exported for the state.
    pub fn level(&self) -> i64 {
        match self {
            LinkState::Disconnected => 0,
            LinkState::Connecting => 1,
            LinkState::Connected => 2,
        }
    }
}

/// Result of [`WifiSupervisor::connect_blocking`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    AlreadyConnected,
    /// Associated after `attempts` association requests.
    Associated { attempts: u64 },
}

/// Result of one watchdog evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    AlreadyConnected,
    Reconnected,
}

/// Establishes and guards the wireless association.
///
/// Association failures are never surfaced as errors: the supervisor retries the same
/// credentials until the radio reports an address.
pub struct WifiSupervisor {
    radio: Arc<dyn WirelessInterface>,
    credentials: Credentials,
    ip: StaticIpConfig,
    poll_interval: Duration,
    watchdog_interval: Duration,
    state_tx: watch::Sender<LinkState>,
    association_attempts: AtomicU64,
    metrics: Option<TransmitterMetrics>,
}

impl WifiSupervisor {
    pub fn new(
        radio: Arc<dyn WirelessInterface>,
        credentials: Credentials,
        ip: StaticIpConfig,
        poll_interval: Duration,
        watchdog_interval: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(LinkState::Disconnected);
        Self {
            radio,
            credentials,
            ip,
            poll_interval,
            watchdog_interval,
            state_tx,
            association_attempts: AtomicU64::new(0),
            metrics: None,
        }
    }

    pub fn from_config(radio: Arc<dyn WirelessInterface>, config: &WifiConfig) -> Self {
        Self::new(
            radio,
            Credentials::from(config),
            StaticIpConfig::from(config),
            config.poll_interval,
            config.watchdog_interval,
        )
    }

    pub fn with_metrics(mut self, metrics: TransmitterMetrics) -> Self {
        metrics.set_link_state(self.state().level());
        self.metrics = Some(metrics);
        self
    }

    /// Current link state.
    pub fn state(&self) -> LinkState {
        *self.state_tx.borrow()
    }

    /// Observe link state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state_tx.subscribe()
    }

    /// Association requests issued since construction.
    pub fn association_attempts(&self) -> u64 {
        self.association_attempts.load(Ordering::Relaxed)
    }

    /// Bring the link up; returns once the radio reports an address.
    pub async fn connect_blocking(&self) -> ConnectOutcome {
        while let Err(err) = self.radio.activate(&self.ip).await {
            warn!(error = %err, "radio activation failed; retrying");
            self.publish(LinkState::Disconnected);
            sleep(self.poll_interval).await;
        }

        if self.radio_connected().await {
            self.publish(LinkState::Connected);
            return ConnectOutcome::AlreadyConnected;
        }

        self.publish(LinkState::Connecting);
        let mut attempts = 1;
        self.request_association().await;
        while !self.radio_connected().await {
            sleep(self.poll_interval).await;
            match self.radio.status().await {
                Ok(status) if status.is_terminal() => {
                    warn!(%status, ssid = %self.credentials.ssid, "association failed; retrying");
                    if let Err(err) = self.radio.disconnect().await {
                        debug!(error = %err, "radio disconnect failed");
                    }
                    attempts += 1;
                    self.request_association().await;
                }
                Ok(status) => debug!(%status, "association in progress"),
                Err(err) => warn!(error = %err, "radio status read failed"),
            }
        }

        self.publish(LinkState::Connected);
        info!(
            ssid = %self.credentials.ssid,
            address = %self.ip.address,
            attempts,
            "wireless link up"
        );
        ConnectOutcome::Associated { attempts }
    }

    /// One watchdog evaluation. Only reads the status while the link is up.
    pub async fn check(&self) -> CheckOutcome {
        if self.radio_connected().await {
            self.publish(LinkState::Connected);
            return CheckOutcome::AlreadyConnected;
        }
        warn!(ssid = %self.credentials.ssid, "wireless link lost; reconnecting");
        self.publish(LinkState::Disconnected);
        self.connect_blocking().await;
        if let Some(metrics) = &self.metrics {
            metrics.inc_reconnect();
        }
        CheckOutcome::Reconnected
    }

    /// Run [`WifiSupervisor::check`] every watchdog interval, forever.
    pub async fn watchdog_loop(&self) {
        let mut ticker = interval(self.watchdog_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if self.check().await == CheckOutcome::Reconnected {
                info!("watchdog restored wireless link");
            }
        }
    }

    async fn request_association(&self) {
        self.association_attempts.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.inc_association_attempt();
        }
        if let Err(err) = self.radio.connect(&self.credentials).await {
            warn!(error = %err, ssid = %self.credentials.ssid, "association request rejected");
        }
    }

    async fn radio_connected(&self) -> bool {
        match self.radio.is_connected().await {
            Ok(connected) => connected,
            Err(err) => {
                warn!(error = %err, "radio connectivity query failed");
                false
            }
        }
    }

    fn publish(&self, next: LinkState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            info!(from = ?previous, to = ?next, "link state changed");
            if let Some(metrics) = &self.metrics {
                metrics.set_link_state(next.level());
            }
        }
    }
}

impl std::fmt::Debug for WifiSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifiSupervisor")
            .field("credentials", &self.credentials)
            .field("ip", &self.ip)
            .field("state", &self.state())
            .finish()
    }
}

