//! # btmonitor
//!
//! Polls for nearby Bluetooth devices and records FOUND/LOST events.
//!
//! ## Running
//!
//! ```bash
//! # Development
//! BTMONITOR_CONFIG=./config.json cargo run --package btmonitor-daemon
//!
//! # Production (under systemd)
//! BTMONITOR_CONFIG=/etc/btmonitor/config.toml ./btmonitor
//! ```
//!
//! The process exits 1 when a scan fails or the adapter cannot be
//! acquired; the service manager is expected to restart it. Configuration
//! errors exit 78 (`EX_CONFIG`).

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::process::ExitCode;

use btmonitor_core::{Config, DebounceEngine, ExitReason, Monitor, MonitorSettings};
use tracing::{error, info};

use btmonitor_daemon::{exit_status, load_config, logging, open_event_log, scanner, shutdown};

#[tokio::main]
async fn main() -> ExitCode {
    // Logging is not up yet, so startup failures go to stderr.
    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("btmonitor: {err} [{}]", err.error_code());
            return ExitCode::from(exit_status(&err));
        }
    };

    if let Err(err) = logging::init(&config.logging, &config.log_dir, logging::is_production()) {
        eprintln!("btmonitor: failed to initialise logging: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(&config).await {
        Ok(ExitReason::Shutdown) => {
            info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        // Already reported by the poll loop.
        Ok(ExitReason::ScanFailed(_)) => ExitCode::FAILURE,
        Err(err) => {
            error!(code = err.error_code(), "{err}");
            ExitCode::from(exit_status(&err))
        }
    }
}

async fn run(config: &Config) -> btmonitor_core::Result<ExitReason> {
    let sink = open_event_log(config)?;
    info!(
        events = %sink.path().display(),
        not_detected_limit = config.presence.not_detected_limit,
        poll_interval_secs = config.presence.poll_interval_secs,
        "Starting btmonitor"
    );

    let mut monitor = Monitor::new(
        scanner(config),
        sink,
        DebounceEngine::new(config.debounce_policy()),
        MonitorSettings {
            poll_interval: config.poll_interval(),
        },
    );

    monitor.run(shutdown::shutdown_signal()).await
}
