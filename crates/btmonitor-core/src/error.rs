//! Unified error types for the btmonitor core library.
//!
//! This module provides a unified error type [`MonitorError`] that covers all
//! failure modes across the system. Each module also has its own specific
//! error type ([`ConfigError`], [`BluetoothError`], [`SinkError`]) for
//! internal use; they convert into [`MonitorError`] with `?`.
//!
//! Failure policy:
//!
//! - **Configuration errors** are fatal before the poll loop starts.
//! - **Scan errors** stop the poll loop (fail-stop, no retry).
//! - **Sink errors** are logged and the loop carries on.
//!
//! # Example
//!
//! ```rust
//! use btmonitor_core::error::{MonitorError, Result};
//! use std::path::PathBuf;
//!
//! fn require_config(path: &PathBuf) -> Result<()> {
//!     if !path.exists() {
//!         return Err(MonitorError::ConfigNotFound(path.clone()));
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::bluetooth::BluetoothError;
use crate::config::ConfigError;
use crate::sink::SinkError;

/// The unified error type for all btmonitor operations.
#[derive(Debug, Error)]
pub enum MonitorError {
    // =========================================================================
    // BLUETOOTH ERRORS
    // =========================================================================
    /// No Bluetooth adapter was found on this system.
    #[error(
        "No Bluetooth adapter found. Ensure Bluetooth hardware is present and drivers are loaded."
    )]
    BluetoothAdapterNotFound,

    /// The Bluetooth adapter exists but is powered off.
    #[error("Bluetooth adapter is powered off. Run 'bluetoothctl power on' to enable.")]
    BluetoothAdapterPoweredOff,

    /// The Bluetooth daemon could not be reached.
    #[error("Bluetooth session failed: {0}. Ensure bluetoothd is running.")]
    BluetoothSessionFailed(String),

    /// A scan failed.
    #[error("Bluetooth scan failed: {0}")]
    BluetoothScanFailed(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // EVENT LOG ERRORS
    // =========================================================================
    /// The log directory or event log could not be prepared.
    #[error("Event log error: {0}")]
    EventLogError(String),
}

/// A specialized [`Result`] type for btmonitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

impl MonitorError {
    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns a machine-readable error code.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::BluetoothAdapterNotFound => "BLUETOOTH_ADAPTER_NOT_FOUND",
            Self::BluetoothAdapterPoweredOff => "BLUETOOTH_ADAPTER_POWERED_OFF",
            Self::BluetoothSessionFailed(_) => "BLUETOOTH_SESSION_FAILED",
            Self::BluetoothScanFailed(_) => "BLUETOOTH_SCAN_FAILED",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::EventLogError(_) => "EVENT_LOG_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<ConfigError> for MonitorError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::NoConfigDir => {
                Self::ConfigNotFound(PathBuf::from("<no platform config directory>"))
            }
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            err @ ConfigError::ValidationError { .. } => {
                Self::ConfigValidationError(err.to_string())
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
            err @ ConfigError::CreateDirError { .. } => Self::EventLogError(err.to_string()),
        }
    }
}

impl From<BluetoothError> for MonitorError {
    fn from(err: BluetoothError) -> Self {
        match err {
            BluetoothError::AdapterNotFound => Self::BluetoothAdapterNotFound,
            BluetoothError::AdapterPoweredOff => Self::BluetoothAdapterPoweredOff,
            BluetoothError::SessionInitFailed { message } => Self::BluetoothSessionFailed(message),
            BluetoothError::DiscoveryFailed { message } | BluetoothError::Internal { message } => {
                Self::BluetoothScanFailed(message)
            }
            BluetoothError::NotStarted => {
                Self::BluetoothScanFailed("scanner has not been started".to_string())
            }
        }
    }
}

impl From<SinkError> for MonitorError {
    fn from(err: SinkError) -> Self {
        Self::EventLogError(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_classification() {
        assert!(MonitorError::ConfigNotFound(PathBuf::from("/test")).is_config_error());
        assert!(MonitorError::ConfigParseError("syntax error".into()).is_config_error());
        assert!(MonitorError::ConfigValidationError("invalid value".into()).is_config_error());
        assert!(!MonitorError::BluetoothAdapterNotFound.is_config_error());
        assert!(!MonitorError::EventLogError("disk full".into()).is_config_error());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            MonitorError::BluetoothAdapterNotFound.error_code(),
            "BLUETOOTH_ADAPTER_NOT_FOUND"
        );
        assert_eq!(
            MonitorError::ConfigNotFound(PathBuf::new()).error_code(),
            "CONFIG_NOT_FOUND"
        );
        assert_eq!(
            MonitorError::EventLogError(String::new()).error_code(),
            "EVENT_LOG_ERROR"
        );
    }

    #[test]
    fn test_from_bluetooth_error() {
        let err: MonitorError = BluetoothError::DiscoveryFailed {
            message: "timeout".into(),
        }
        .into();
        assert!(matches!(err, MonitorError::BluetoothScanFailed(ref m) if m == "timeout"));

        let err: MonitorError = BluetoothError::NotStarted.into();
        assert_eq!(err.error_code(), "BLUETOOTH_SCAN_FAILED");
    }

    #[test]
    fn test_from_config_validation_errors() {
        let err: MonitorError = ConfigError::MultipleValidationErrors(vec![
            ConfigError::ValidationError {
                field: "log_dir",
                message: "must not be empty".into(),
            },
            ConfigError::ValidationError {
                field: "presence.not_detected_limit",
                message: "must be at least 1".into(),
            },
        ])
        .into();

        let message = err.to_string();
        assert!(message.contains("log_dir"));
        assert!(message.contains("presence.not_detected_limit"));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_from_create_dir_error_is_event_log_error() {
        let err: MonitorError = ConfigError::CreateDirError {
            path: PathBuf::from("/var/log/btmonitor"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }
        .into();

        assert_eq!(err.error_code(), "EVENT_LOG_ERROR");
        assert!(err.to_string().contains("/var/log/btmonitor"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<MonitorError>();
        assert_sync::<MonitorError>();
    }
}
