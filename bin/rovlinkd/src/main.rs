//! ---
//! rovlink_section: "01-core-functionality"
//! rovlink_subsection: "binary"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Binary entrypoint for the rovlink daemon."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rovlink_common::{init_tracing, AppConfig, Mode};
use rovlink_metrics::{new_registry, spawn_http_server, MetricsServer, SharedRegistry};
use tokio::runtime::{Builder, Runtime};
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("rovlink ", env!("CARGO_PKG_VERSION")),
    about = "rovlink tele-operation daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, help = "Override application mode")]
    mode: Option<CliMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Production,
    Simulation,
}

impl From<CliMode> for Mode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Production => Mode::Production,
            CliMode::Simulation => Mode::Simulation,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the transmitter: link supervisor, HTTP control and video stream")]
    Transmit,
    #[command(about = "Run the receiver: execute serial commands on the actuators")]
    Receive,
    #[command(about = "Connect to a transmitter and decode its video stream")]
    View {
        #[arg(long, value_name = "ADDR", help = "Video stream address")]
        video_addr: Option<SocketAddr>,
        #[arg(long, value_name = "FILE", help = "Keep the latest frame in this PPM file")]
        snapshot: Option<PathBuf>,
        #[arg(long, value_name = "N", help = "Integer upscale factor")]
        scale: Option<u32>,
    },
    #[command(about = "Print the effective configuration and exit")]
    ShowConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/rovlink.toml"));
    candidates.push(PathBuf::from("configs/rovlink.example.toml"));

    let load_started = Instant::now();
    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }

    let role = match &cli.command {
        Commands::Transmit => Role::Transmitter,
        Commands::Receive => Role::Receiver,
        Commands::View {
            video_addr,
            snapshot,
            scale,
        } => {
            if let Some(addr) = video_addr {
                config.viewer.video_addr = *addr;
            }
            if let Some(path) = snapshot {
                config.viewer.snapshot = Some(path.clone());
            }
            if let Some(scale) = scale {
                config.viewer.scale = *scale;
            }
            config.validate()?;
            Role::Viewer
        }
        Commands::ShowConfig => {
            let mut shown = config.clone();
            if !shown.wifi.password.is_empty() {
                shown.wifi.password = "<redacted>".to_owned();
            }
            println!("# source: {}", loaded.source.display());
            print!("{}", toml::to_string_pretty(&shown)?);
            return Ok(());
        }
    };

    init_tracing(role.service_name(), &config.logging)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = %loaded.source.display(),
        load_ms = load_started.elapsed().as_millis() as u64,
        mode = ?config.mode,
        "configuration loaded"
    );

    // The transmitter runs its loops cooperatively on one thread.
    let runtime = match role {
        Role::Transmitter => Builder::new_current_thread().enable_all().build(),
        Role::Receiver | Role::Viewer => Builder::new_multi_thread().enable_all().build(),
    }
    .context("building tokio runtime")?;

    run_role(&runtime, role, config)
}

#[derive(Debug, Clone, Copy)]
enum Role {
    Transmitter,
    Receiver,
    Viewer,
}

impl Role {
    fn service_name(self) -> &'static str {
        match self {
            Role::Transmitter => "transmitter",
            Role::Receiver => "receiver",
            Role::Viewer => "viewer",
        }
    }
}

fn run_role(runtime: &Runtime, role: Role, config: AppConfig) -> Result<()> {
    runtime.block_on(async move {
        let registry = new_registry();
        let metrics_server = start_metrics(&config, &registry)?;

        let outcome = match role {
            Role::Transmitter => {
                rovlink_transmitter::run_transmitter(&config, &registry, termination()).await
            }
            Role::Receiver => {
                rovlink_receiver::run_receiver(&config, &registry, termination()).await
            }
            Role::Viewer => rovlink_viewer::run_viewer(&config, &registry, termination()).await,
        };

        if let Some(server) = metrics_server {
            server.shutdown().await?;
        }
        outcome
    })
}

fn start_metrics(config: &AppConfig, registry: &SharedRegistry) -> Result<Option<MetricsServer>> {
    if !config.metrics.enabled {
        info!("metrics exporter disabled by configuration");
        return Ok(None);
    }
    let server = spawn_http_server(registry.clone(), config.metrics.listen)?;
    info!(address = %server.addr(), "metrics exporter enabled");
    Ok(Some(server))
}

async fn termination() {
    match signal::ctrl_c().await {
        Ok(()) => info!("ctrl-c received; shutting down"),
        Err(err) => warn!(error = %err, "unable to listen for ctrl-c; shutting down"),
    }
}
