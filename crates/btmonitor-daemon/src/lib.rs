//! # btmonitor-daemon
//!
//! Process shell for the btmonitor presence tracker: logging setup,
//! startup, scanner selection and shutdown signals.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod logging;
pub mod shutdown;

use btmonitor_core::{Config, JsonLinesSink, MonitorError};

/// Exit status for configuration errors (`EX_CONFIG` from sysexits.h).
pub const EXIT_CONFIG: u8 = 78;

/// Exit status for every other failure.
pub const EXIT_FAILURE: u8 = 1;

/// Load the configuration and create its log directory.
///
/// # Errors
///
/// Returns a configuration error if the file is missing, unparsable or
/// invalid, and an event log error if the log directory cannot be created.
pub fn load_config() -> btmonitor_core::Result<Config> {
    let config = Config::load()?;
    config.ensure_log_dir()?;
    Ok(config)
}

/// Open the event log named by `config`.
///
/// # Errors
///
/// Returns [`MonitorError::EventLogError`] if the file cannot be opened.
pub fn open_event_log(config: &Config) -> btmonitor_core::Result<JsonLinesSink> {
    Ok(JsonLinesSink::open(config.events_path())?)
}

/// Process exit status for a startup failure.
#[must_use]
pub const fn exit_status(err: &MonitorError) -> u8 {
    if err.is_config_error() {
        EXIT_CONFIG
    } else {
        EXIT_FAILURE
    }
}

/// The BlueZ scanner for the configured adapter.
#[cfg(feature = "bluetooth")]
#[must_use]
pub fn scanner(config: &Config) -> btmonitor_core::BluezScanner {
    btmonitor_core::BluezScanner::new(config.scan.adapter.clone(), config.scan_timeout())
}

/// Built without Bluetooth support: a scanner that never sees anything.
#[cfg(not(feature = "bluetooth"))]
#[must_use]
pub fn scanner(_config: &Config) -> btmonitor_core::MockScanner {
    tracing::warn!("Built without Bluetooth support, using an idle mock scanner");
    btmonitor_core::MockScanner::idle()
}
