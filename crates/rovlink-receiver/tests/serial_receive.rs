//! ---
//! rovlink_section: "15-testing-qa-runbook"
//! rovlink_subsection: "integration-test"
//! rovlink_type: "test"
//! rovlink_scope: "code"
//! rovlink_description: "Receiver loop over the TCP serial bridge."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rovlink_common::{SerialConfig, SerialEndpoint};
use rovlink_metrics::{prometheus::Registry, ReceiverMetrics};
use rovlink_msg::{LineReceiver, LineTimeouts};
use rovlink_receiver::{
    serve_session, CommandExecutor, Receiver, SerialSource, SimulatedArm, SimulatedDrive,
};
use tokio::io::{duplex, AsyncWriteExt};
use tokio::net::TcpStream;

fn counter(registry: &Registry, name: &str, label: &str) -> u64 {
    registry
        .gather()
        .iter()
        .filter(|family| family.get_name() == name)
        .flat_map(|family| family.get_metric().iter())
        .filter(|metric| metric.get_label().iter().any(|pair| pair.get_value() == label))
        .map(|metric| metric.get_counter().get_value() as u64)
        .sum()
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    tokio::time::timeout(Duration::from_secs(3), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

#[tokio::test]
async fn session_executes_valid_lines_and_drops_the_rest() -> Result<()> {
    let drive = Arc::new(SimulatedDrive::new(0.0));
    let arm = Arc::new(SimulatedArm::new(0.0));
    let executor = CommandExecutor::new(drive.clone(), arm.clone());
    let registry = Registry::new();
    let metrics = ReceiverMetrics::new(&registry)?;

    let (mut tx, rx) = duplex(256);
    tx.write_all(b"MOVE:W\nMOVE:Q\nARM:10,20\nARM:10,20,30\r\n").await?;
    drop(tx);

    let mut lines = LineReceiver::new(rx, LineTimeouts::default(), 256);
    let fault = serve_session(&mut lines, &executor, Some(&metrics)).await;
    assert!(fault.is_transport());

    assert_eq!(drive.odometry().travelled, 5.0);
    let pose = arm.pose();
    assert_eq!((pose.base, pose.shoulder, pose.elbow), (10.0, 20.0, 30.0));
    assert_eq!(
        counter(&registry, "rovlink_commands_executed_total", "move"),
        1
    );
    assert_eq!(
        counter(&registry, "rovlink_commands_dropped_total", "unknown_move_token"),
        1
    );
    assert_eq!(
        counter(&registry, "rovlink_commands_dropped_total", "wrong_arity"),
        1
    );
    Ok(())
}

#[tokio::test]
async fn tcp_bridge_is_reopened_after_peer_loss() -> Result<()> {
    let drive = Arc::new(SimulatedDrive::new(0.0));
    let arm = Arc::new(SimulatedArm::new(0.0));
    let executor = CommandExecutor::new(drive.clone(), arm.clone());

    let endpoint = SerialEndpoint::Tcp {
        address: "127.0.0.1:0".parse()?,
    };
    let source = SerialSource::prepare(&endpoint).await?;
    let address = source.local_addr().expect("tcp bridge address");
    let serial = SerialConfig {
        endpoint,
        ..SerialConfig::default()
    };
    let receiver = Arc::new(
        Receiver::new(source, executor, &serial).with_reopen_delay(Duration::from_millis(10)),
    );
    let task = tokio::spawn({
        let receiver = receiver.clone();
        async move { receiver.run().await }
    });

    let mut first = TcpStream::connect(address).await?;
    first.write_all(b"MOVE:W\n").await?;
    assert!(wait_until(|| drive.odometry().travelled >= 5.0).await);
    drop(first);

    // the next session is accepted once the previous one has ended
    let mut second = TcpStream::connect(address).await?;
    second.write_all(b"MOVE:S\nARM:45,30,90\n").await?;
    assert!(wait_until(|| drive.odometry().travelled >= 10.0).await);
    assert!(wait_until(|| arm.pose().base == 45.0).await);

    task.abort();
    Ok(())
}
