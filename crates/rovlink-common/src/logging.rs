//! ---
//! rovlink_section: "03-logging-metrics"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Tracing subscriber setup for the transmitter, receiver and viewer."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "ROVLINK_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Writer guards must outlive the process or buffered lines are lost on exit.
struct LogGuards {
    _console: WorkerGuard,
    _file: Option<WorkerGuard>,
}

static GUARDS: OnceCell<LogGuards> = OnceCell::new();

/// Console output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    StructuredJson,
    #[default]
    Pretty,
    /// Single-line output without targets, for narrow serial consoles.
    Compact,
}

/// File name of the rolling log for `service`, before the date suffix.
pub fn log_file_name(config: &LoggingConfig, service: &str) -> String {
    let prefix = config.file_prefix.as_deref().unwrap_or("rovlink");
    format!("{prefix}-{service}.log")
}

fn filter_from_env() -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive {directive:?} ({err}); using {DEFAULT_DIRECTIVE}");
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        Err(_) => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
        }
    }
}

/// Install the global subscriber for one rovlink role.
///
/// The filter comes from `ROVLINK_LOG`, then `RUST_LOG`, then `info`. Console output follows
/// [`LoggingConfig::format`]. Unless [`LoggingConfig::file`] is off, a daily rolling JSON file
/// is also written to [`LoggingConfig::directory`]. Calling this twice keeps the first
/// subscriber.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    let (console_writer, console_guard) = tracing_appender::non_blocking(std::io::stdout());
    let console_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .json()
            .with_current_span(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(console_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(console_writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .without_time()
            .with_writer(console_writer)
            .boxed(),
    };

    let (file_layer, file_guard) = if config.file {
        std::fs::create_dir_all(&config.directory).with_context(|| {
            format!("creating log directory {}", config.directory.display())
        })?;
        let appender = daily(&config.directory, log_file_name(config, service_name));
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .json()
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(writer)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let installed = tracing_subscriber::registry()
        .with(filter_from_env())
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok();
    if installed {
        let _ = GUARDS.set(LogGuards {
            _console: console_guard,
            _file: file_guard,
        });
        info!(
            service = service_name,
            file = config.file,
            log_dir = %config.directory.display(),
            format = ?config.format,
            "tracing initialised"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_uses_prefix_and_service() {
        let mut config = LoggingConfig::default();
        assert_eq!(log_file_name(&config, "receiver"), "rovlink-receiver.log");
        config.file_prefix = Some("rover7".into());
        assert_eq!(log_file_name(&config, "viewer"), "rover7-viewer.log");
    }

    #[test]
    fn init_creates_log_directory_and_tolerates_reinit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = LoggingConfig {
            directory: dir.path().join("logs"),
            format: LogFormat::Compact,
            file_prefix: Some("test".into()),
            file: true,
        };
        init_tracing("unit", &config).expect("tracing init");
        assert!(config.directory.is_dir());
        init_tracing("unit", &config).expect("tracing re-init");
    }

    #[test]
    fn file_logging_can_be_disabled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = LoggingConfig {
            directory: dir.path().join("never"),
            file: false,
            ..LoggingConfig::default()
        };
        init_tracing("unit", &config).expect("tracing init");
        assert!(!config.directory.exists());
    }
}
