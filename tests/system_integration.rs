//! ---
//! rovlink_section: "15-testing-qa-runbook"
//! rovlink_subsection: "integration-test"
//! rovlink_type: "test"
//! rovlink_scope: "code"
//! rovlink_description: "Transmitter, receiver and viewer wired together over loopback."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rovlink_common::{AppConfig, Mode, SerialEndpoint};
use rovlink_link::LinkState;
use rovlink_metrics::prometheus::Registry;
use rovlink_msg::{rgb565_to_rgb888, RgbImage};
use rovlink_receiver::{CommandExecutor, Receiver, SerialSource, SimulatedArm, SimulatedDrive};
use rovlink_transmitter::Transmitter;
use rovlink_viewer::{FrameSink, FrameSinkError, ViewerClient};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

struct Robot {
    drive: Arc<SimulatedDrive>,
    arm: Arc<SimulatedArm>,
    serial: SocketAddr,
    task: tokio::task::JoinHandle<()>,
}

async fn start_robot(config: &AppConfig) -> Result<Robot> {
    let drive = Arc::new(SimulatedDrive::new(0.0));
    let arm = Arc::new(SimulatedArm::new(0.0));
    let source = SerialSource::prepare(&SerialEndpoint::Tcp {
        address: "127.0.0.1:0".parse()?,
    })
    .await?;
    let serial = source.local_addr().expect("tcp bridge address");
    let receiver = Receiver::new(
        source,
        CommandExecutor::new(drive.clone(), arm.clone()),
        &config.serial,
    )
    .with_reopen_delay(Duration::from_millis(10));
    let task = tokio::spawn(async move { receiver.run().await });
    Ok(Robot {
        drive,
        arm,
        serial,
        task,
    })
}

fn loopback_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.mode = Mode::Simulation;
    config.wifi.ssid = "robot-net".into();
    config.wifi.poll_interval = Duration::from_millis(10);
    config.control.listen = "127.0.0.1:0".parse().expect("addr");
    config.video.listen = "127.0.0.1:0".parse().expect("addr");
    config.video.exposure = Duration::from_millis(1);
    config.video.frame_interval = Duration::from_millis(5);
    config
}

async fn get(addr: SocketAddr, target: &str) -> Result<String> {
    let mut stream = TcpStream::connect(addr).await?;
    stream
        .write_all(format!("GET {target} HTTP/1.1\r\nHost: rover\r\n\r\n").as_bytes())
        .await?;
    let mut raw = String::new();
    tokio::time::timeout(Duration::from_secs(3), stream.read_to_string(&mut raw)).await??;
    let body = raw.split("\r\n\r\n").nth(1).unwrap_or_default();
    Ok(body.to_owned())
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
async fn browser_commands_reach_the_actuators() -> Result<()> {
    let mut config = loopback_config();
    let robot = start_robot(&config).await?;
    config.serial.endpoint = SerialEndpoint::Tcp {
        address: robot.serial,
    };

    let registry = Registry::new();
    let transmitter = Transmitter::start(&config, &registry).await?;
    assert_eq!(transmitter.supervisor().state(), LinkState::Connected);

    let control = transmitter.control_addr();
    assert_eq!(get(control, "/move?cmd=W").await?, "OK");
    assert_eq!(get(control, "/move?cmd=D").await?, "OK");
    assert_eq!(get(control, "/arm?b=120&h=60&c=45").await?, "OK");
    assert_eq!(get(control, "/arm?b=120&h=60").await?, "ERR");
    // forwarded verbatim; the receiver drops it
    assert_eq!(get(control, "/move?cmd=Q").await?, "OK");

    assert!(wait_until(|| robot.arm.pose().base == 120.0).await);
    let odometry = robot.drive.odometry();
    assert_eq!(odometry.travelled, 5.0);
    assert_eq!(odometry.heading, 330.0);
    let pose = robot.arm.pose();
    assert_eq!((pose.shoulder, pose.elbow), (60.0, 45.0));

    transmitter.shutdown().await?;
    robot.task.abort();
    Ok(())
}

struct Keep(Vec<RgbImage>);

// sensor noise flips the two least significant bits of the 5-bit blue channel
fn without_noise([r, g, b]: [u8; 3]) -> [u8; 3] {
    [r, g, b & 0xE0]
}

#[async_trait]
impl FrameSink for Keep {
    async fn present(&mut self, image: &RgbImage) -> Result<(), FrameSinkError> {
        self.0.push(image.clone());
        Ok(())
    }
}

#[tokio::test]
async fn viewer_decodes_the_transmitted_pattern() -> Result<()> {
    let mut config = loopback_config();
    let robot = start_robot(&config).await?;
    config.serial.endpoint = SerialEndpoint::Tcp {
        address: robot.serial,
    };

    let registry = Registry::new();
    let transmitter = Transmitter::start(&config, &registry).await?;

    let client = ViewerClient::new(transmitter.video_addr(), Default::default()).with_scale(2);
    let mut sink = Keep(Vec::new());
    let presented = tokio::time::timeout(
        Duration::from_secs(5),
        client.stream_once(&mut sink, Some(3)),
    )
    .await??;

    assert_eq!(presented, 3);
    let bars: Vec<[u8; 3]> = [0xFFFFu16, 0xFFE0, 0x07FF, 0x07E0, 0xF81F, 0xF800, 0x001F, 0x0000]
        .iter()
        .map(|bar| without_noise(rgb565_to_rgb888((bar >> 8) as u8, *bar as u8)))
        .collect();
    for image in &sink.0 {
        assert_eq!((image.width(), image.height()), (160, 120));
        let mut seen = Vec::new();
        for x in 0..image.width() {
            let colour = without_noise(image.pixel(x, 7).expect("pixel in range"));
            assert!(bars.contains(&colour), "unexpected colour {colour:?} at x={x}");
            if !seen.contains(&colour) {
                seen.push(colour);
            }
        }
        assert_eq!(seen.len(), bars.len());
    }

    transmitter.shutdown().await?;
    robot.task.abort();
    Ok(())
}
