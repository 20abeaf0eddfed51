//! Logging initialization and configuration.
//!
//! This module provides environment-aware logging setup:
//! - **Production**: compact logs to stdout, optionally JSON logs to a
//!   rolling file in the log directory
//! - **Development**: pretty logs to stdout
//!
//! These are the operational diagnostics. Presence events are written
//! separately, by the event sink.

use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use btmonitor_core::LoggingConfig;

/// Environment variable selecting the logging mode.
pub const ENV_MODE_VAR: &str = "BTMONITOR_ENV";

/// File name prefix for the diagnostic log.
const FILE_PREFIX: &str = "btmonitor";

/// Static guards to keep non-blocking writers alive.
/// These must persist for the lifetime of the program.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static STDOUT_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Whether to use production logging.
///
/// `BTMONITOR_ENV=production` forces it on, any other value forces it off;
/// unset, release builds are production.
#[must_use]
pub fn is_production() -> bool {
    production_from(std::env::var(ENV_MODE_VAR).ok().as_deref())
}

fn production_from(mode: Option<&str>) -> bool {
    mode.map_or(!cfg!(debug_assertions), |mode| {
        mode.eq_ignore_ascii_case("production")
    })
}

/// Initialize the logging system.
///
/// `RUST_LOG` takes precedence over `config.level`. When `config.file` is
/// set, JSON diagnostics also go to a daily rolling file in `log_dir`.
///
/// # Errors
///
/// Returns an error if the level filter cannot be parsed or the rolling
/// file cannot be created.
pub fn init(config: &LoggingConfig, log_dir: &Path, is_production: bool) -> anyhow::Result<()> {
    let env_filter = env_filter(&config.level)?;

    let file_layer = if config.file {
        let (writer, guard) = tracing_appender::non_blocking(rolling_appender(log_dir)?);
        let _ = FILE_GUARD.set(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
    } else {
        None
    };

    if is_production {
        let (stdout, guard) = tracing_appender::non_blocking(std::io::stdout());
        let _ = STDOUT_GUARD.set(guard);

        // Compact, no ANSI colors, for journald
        let stdout_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(stdout)
            .with_target(false)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(stdout_layer)
            .init();
    } else {
        let stdout_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(stdout_layer)
            .init();
    }

    Ok(())
}

fn env_filter(level: &str) -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?)
}

fn rolling_appender(log_dir: &Path) -> anyhow::Result<RollingFileAppender> {
    Ok(RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(FILE_PREFIX)
        .filename_suffix("log")
        .build(log_dir)?)
}
