//! # btmonitor-core
//!
//! Core logic for the btmonitor Bluetooth presence tracker.
//!
//! This crate provides:
//! - Debounced presence tracking: a noisy sequence of scan snapshots in,
//!   a stable stream of FOUND/LOST events out
//! - Bluetooth scanning through BlueZ (feature `bluetooth`)
//! - A JSON Lines event log
//! - Configuration loading and validation
//! - The poll loop tying them together
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`types`] - Scan observations, signal strength and presence events
//! - [`registry`] - Address-keyed store of tracked devices
//! - [`debounce`] - The presence state machine
//! - [`bluetooth`] - Scan source trait, BlueZ scanner and scripted mock
//! - [`sink`] - Structured event sinks
//! - [`monitor`] - The poll loop
//! - [`config`] - Configuration loading, environment overrides and validation
//! - [`error`] - Unified error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod bluetooth;
pub mod config;
pub mod debounce;
pub mod error;
pub mod monitor;
pub mod registry;
pub mod sink;
pub mod types;

// Re-export primary types for convenience
#[cfg(feature = "bluetooth")]
pub use bluetooth::BluezScanner;
#[cfg(any(feature = "mock-bluetooth", not(feature = "bluetooth")))]
pub use bluetooth::{MockScanner, WhenExhausted};
pub use bluetooth::{BluetoothError, BluetoothResult, ScanSource};
pub use config::{
    Config, ConfigError, ConfigResult, LoggingConfig, PresenceConfig, ScanConfig, CONFIG_ENV_VAR,
};
pub use debounce::{DebounceEngine, DebouncePolicy, MetadataPolicy, DEFAULT_NOT_DETECTED_LIMIT};
pub use error::{MonitorError, Result};
pub use monitor::{ExitReason, Monitor, MonitorSettings, StepOutcome, DEFAULT_POLL_INTERVAL};
pub use registry::{PresenceRegistry, TrackedDevice};
pub use sink::{EventSink, JsonLinesSink, MemorySink, SinkError, SinkResult, DEFAULT_EVENTS_FILE};
pub use types::{DeviceObservation, PresenceEvent, PresenceStatus, Signal};
