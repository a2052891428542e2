//! ---
//! rovlink_section: "15-testing-qa-runbook"
//! rovlink_subsection: "integration-test"
//! rovlink_type: "test"
//! rovlink_scope: "code"
//! rovlink_description: "Wi-Fi supervisor behaviour against the simulated radio."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use rovlink_link::{
    report_link_status, CheckOutcome, ConnectOutcome, Credentials, HostNetwork, LinkState,
    RadioStatus, SimulatedRadio, StaticIpConfig, WifiSupervisor,
};

const POLL: Duration = Duration::from_millis(5);

fn supervisor(radio: Arc<SimulatedRadio>, watchdog: Duration) -> WifiSupervisor {
    WifiSupervisor::new(
        radio,
        Credentials {
            ssid: "rover".into(),
            password: "secret".into(),
        },
        StaticIpConfig {
            address: Ipv4Addr::new(192, 168, 197, 208),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 197, 1),
            dns: Ipv4Addr::new(8, 8, 8, 8),
        },
        POLL,
        watchdog,
    )
}

#[tokio::test]
async fn retries_same_credentials_after_terminal_statuses() {
    let radio = Arc::new(
        SimulatedRadio::new("rover")
            .with_polls_to_associate(0)
            .with_failures([RadioStatus::NoApFound, RadioStatus::WrongPassword]),
    );
    let supervisor = supervisor(radio.clone(), Duration::from_secs(10));

    let outcome = supervisor.connect_blocking().await;
    assert_eq!(outcome, ConnectOutcome::Associated { attempts: 3 });
    assert_eq!(radio.connect_calls(), 3);
    assert_eq!(radio.disconnect_calls(), 2);
    assert_eq!(supervisor.state(), LinkState::Connected);
    assert_eq!(supervisor.association_attempts(), 3);
    assert!(radio.applied_ip().is_some());
}

#[tokio::test]
async fn connect_blocking_is_a_no_op_when_already_connected() {
    let radio = Arc::new(SimulatedRadio::new("rover"));
    let supervisor = supervisor(radio.clone(), Duration::from_secs(10));
    supervisor.connect_blocking().await;
    let calls = radio.connect_calls();

    assert_eq!(
        supervisor.connect_blocking().await,
        ConnectOutcome::AlreadyConnected
    );
    assert_eq!(radio.connect_calls(), calls);
}

#[tokio::test]
async fn check_while_connected_makes_no_association_attempt() {
    let radio = Arc::new(SimulatedRadio::new("rover"));
    let supervisor = supervisor(radio.clone(), Duration::from_secs(10));
    supervisor.connect_blocking().await;
    let calls = radio.connect_calls();
    let reads = radio.status_reads();

    for _ in 0..3 {
        assert_eq!(supervisor.check().await, CheckOutcome::AlreadyConnected);
    }
    assert_eq!(radio.connect_calls(), calls);
    assert_eq!(radio.disconnect_calls(), 0);
    assert_eq!(radio.status_reads(), reads + 3);
}

#[tokio::test]
async fn check_restores_a_dropped_link() {
    let radio = Arc::new(SimulatedRadio::new("rover"));
    let supervisor = supervisor(radio.clone(), Duration::from_secs(10));
    supervisor.connect_blocking().await;
    let mut states = supervisor.subscribe();
    states.borrow_and_update();

    radio.drop_link();
    assert_eq!(supervisor.check().await, CheckOutcome::Reconnected);
    assert_eq!(supervisor.state(), LinkState::Connected);
    assert_eq!(radio.connect_calls(), 2);
    assert!(states.has_changed().unwrap());
}

#[tokio::test]
async fn watchdog_loop_reconnects_in_background() {
    let radio = Arc::new(SimulatedRadio::new("rover"));
    let supervisor = Arc::new(supervisor(radio.clone(), Duration::from_millis(20)));
    supervisor.connect_blocking().await;

    let watchdog = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.watchdog_loop().await })
    };

    radio.drop_link();
    let reconnected = tokio::time::timeout(Duration::from_secs(2), async {
        while radio.connect_calls() < 2 || supervisor.state() != LinkState::Connected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    watchdog.abort();
    assert!(reconnected.is_ok(), "watchdog did not restore the link");
}

#[tokio::test]
async fn status_reporter_sees_transitions_until_supervisor_drops() {
    let radio = Arc::new(SimulatedRadio::new("rover").with_polls_to_associate(2));
    let supervisor = supervisor(radio, Duration::from_secs(10));
    let reporter = tokio::spawn(report_link_status(supervisor.subscribe()));

    supervisor.connect_blocking().await;
    tokio::task::yield_now().await;
    drop(supervisor);

    let transitions = reporter.await.expect("reporter task");
    assert!(transitions >= 1);
}

#[tokio::test]
async fn host_network_is_always_connected() {
    let supervisor = WifiSupervisor::new(
        Arc::new(HostNetwork),
        Credentials {
            ssid: String::new(),
            password: String::new(),
        },
        StaticIpConfig {
            address: Ipv4Addr::LOCALHOST,
            netmask: Ipv4Addr::new(255, 0, 0, 0),
            gateway: Ipv4Addr::LOCALHOST,
            dns: Ipv4Addr::LOCALHOST,
        },
        POLL,
        Duration::from_secs(10),
    );
    assert_eq!(
        supervisor.connect_blocking().await,
        ConnectOutcome::AlreadyConnected
    );
    assert_eq!(supervisor.check().await, CheckOutcome::AlreadyConnected);
}
