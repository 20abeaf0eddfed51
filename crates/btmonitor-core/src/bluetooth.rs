//! Bluetooth scan sources.
//!
//! This module provides:
//! - The [`ScanSource`] trait the poll loop drives
//! - [`BluezScanner`], a BlueZ-backed scanner (feature `bluetooth`, Linux)
//! - [`MockScanner`], a scripted scanner for tests and non-Linux builds
//!
//! A scan source is acquired with [`ScanSource::start`] and released with
//! [`ScanSource::stop`]; [`ScanSource::scan`] returns one snapshot of the
//! devices currently in range.

#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
use std::collections::VecDeque;

use thiserror::Error;

use crate::types::DeviceObservation;

/// Errors raised by a scan source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BluetoothError {
    /// No usable Bluetooth adapter.
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// The adapter is off and could not be powered on.
    #[error("Bluetooth adapter is powered off")]
    AdapterPoweredOff,

    /// Connecting to the Bluetooth daemon failed.
    #[error("Failed to open Bluetooth session: {message}")]
    SessionInitFailed {
        /// Underlying error message.
        message: String,
    },

    /// A scan could not be completed.
    #[error("Device discovery failed: {message}")]
    DiscoveryFailed {
        /// Underlying error message.
        message: String,
    },

    /// `scan` was called before `start`.
    #[error("Scanner has not been started")]
    NotStarted,

    /// Any other adapter failure.
    #[error("Bluetooth error: {message}")]
    Internal {
        /// Underlying error message.
        message: String,
    },
}

/// Result type for scan source operations.
pub type BluetoothResult<T> = std::result::Result<T, BluetoothError>;

/// A capability that reports the devices currently in range.
///
/// Implementations may be unreliable: a device in range can be missing
/// from any given snapshot.
#[allow(async_fn_in_trait)]
pub trait ScanSource {
    /// Acquire the underlying adapter.
    async fn start(&mut self) -> BluetoothResult<()>;

    /// Run one scan and return the devices seen.
    async fn scan(&mut self) -> BluetoothResult<Vec<DeviceObservation>>;

    /// Release the underlying adapter.
    async fn stop(&mut self) -> BluetoothResult<()>;
}

#[cfg(feature = "bluetooth")]
pub use bluez::BluezScanner;

#[cfg(feature = "bluetooth")]
mod bluez {
    use std::time::Duration;

    use bluer::{Adapter, AdapterEvent, Address, Session};
    use futures::{pin_mut, StreamExt};
    use tracing::{debug, info};

    use super::{BluetoothError, BluetoothResult, ScanSource};
    use crate::types::{DeviceObservation, Signal};

    /// Scanner backed by BlueZ over D-Bus.
    ///
    /// Each scan runs a discovery window of `scan_timeout` and reports the
    /// devices that advertised during it.
    pub struct BluezScanner {
        adapter_name: Option<String>,
        scan_timeout: Duration,
        adapter: Option<Adapter>,
    }

    impl BluezScanner {
        /// Create a scanner for the named adapter (or the default one).
        #[must_use]
        pub const fn new(adapter_name: Option<String>, scan_timeout: Duration) -> Self {
            Self {
                adapter_name,
                scan_timeout,
                adapter: None,
            }
        }
    }

    fn internal(err: &bluer::Error) -> BluetoothError {
        BluetoothError::Internal {
            message: err.to_string(),
        }
    }

    impl ScanSource for BluezScanner {
        async fn start(&mut self) -> BluetoothResult<()> {
            let session = Session::new()
                .await
                .map_err(|e| BluetoothError::SessionInitFailed {
                    message: e.to_string(),
                })?;

            let adapter = match self.adapter_name.as_deref() {
                Some(name) => session.adapter(name),
                None => session.default_adapter().await,
            }
            .map_err(|_| BluetoothError::AdapterNotFound)?;

            if !adapter.is_powered().await.map_err(|e| internal(&e))? {
                info!(adapter = adapter.name(), "Powering on Bluetooth adapter");
                adapter
                    .set_powered(true)
                    .await
                    .map_err(|_| BluetoothError::AdapterPoweredOff)?;
            }

            info!(
                adapter = adapter.name(),
                scan_timeout_secs = self.scan_timeout.as_secs(),
                "Bluetooth scanner started"
            );

            // The adapter keeps the D-Bus session alive.
            self.adapter = Some(adapter);
            Ok(())
        }

        async fn scan(&mut self) -> BluetoothResult<Vec<DeviceObservation>> {
            let adapter = self.adapter.as_ref().ok_or(BluetoothError::NotStarted)?;

            let events = adapter
                .discover_devices()
                .await
                .map_err(|e| BluetoothError::DiscoveryFailed {
                    message: e.to_string(),
                })?;
            pin_mut!(events);

            let mut seen: Vec<Address> = Vec::new();
            let window = tokio::time::sleep(self.scan_timeout);
            tokio::pin!(window);

            loop {
                tokio::select! {
                    () = &mut window => break,
                    event = events.next() => match event {
                        Some(AdapterEvent::DeviceAdded(address)) => {
                            if !seen.contains(&address) {
                                seen.push(address);
                            }
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }

            // Read properties while discovery is still running: BlueZ only
            // keeps RSSI for devices heard during the active discovery.
            let mut snapshot = Vec::with_capacity(seen.len());
            for address in seen {
                let device = adapter.device(address).map_err(|e| internal(&e))?;
                let Some(rssi) = device.rssi().await.ok().flatten() else {
                    continue;
                };
                let name = device.name().await.ok().flatten();
                snapshot.push(DeviceObservation {
                    address: address.to_string(),
                    name,
                    signal: Some(Signal::Dbm(rssi)),
                });
            }

            debug!(devices = snapshot.len(), "Discovery window closed");
            Ok(snapshot)
        }

        async fn stop(&mut self) -> BluetoothResult<()> {
            if let Some(adapter) = self.adapter.take() {
                info!(adapter = adapter.name(), "Bluetooth scanner stopped");
            }
            Ok(())
        }
    }
}

/// What a [`MockScanner`] does once its script runs out.
#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhenExhausted {
    /// Keep returning empty snapshots.
    RepeatEmpty,
    /// Fail every further scan with this message.
    Fail(String),
}

/// Scanner that replays scripted snapshots.
#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
#[derive(Debug, Clone)]
pub struct MockScanner {
    script: VecDeque<Vec<DeviceObservation>>,
    when_exhausted: WhenExhausted,
    fail_start: bool,
    started: bool,
    start_calls: usize,
    stop_calls: usize,
    scan_calls: usize,
}

#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
impl MockScanner {
    /// Replay `script`, then keep returning empty snapshots.
    pub fn new(script: impl IntoIterator<Item = Vec<DeviceObservation>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            when_exhausted: WhenExhausted::RepeatEmpty,
            fail_start: false,
            started: false,
            start_calls: 0,
            stop_calls: 0,
            scan_calls: 0,
        }
    }

    /// A scanner that never sees anything.
    #[must_use]
    pub fn idle() -> Self {
        Self::new(Vec::new())
    }

    /// Fail with `message` once the script is exhausted.
    #[must_use]
    pub fn fail_when_exhausted(mut self, message: impl Into<String>) -> Self {
        self.when_exhausted = WhenExhausted::Fail(message.into());
        self
    }

    /// Make `start` fail.
    #[must_use]
    pub fn fail_on_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Number of `start` calls.
    #[must_use]
    pub const fn start_calls(&self) -> usize {
        self.start_calls
    }

    /// Number of `stop` calls.
    #[must_use]
    pub const fn stop_calls(&self) -> usize {
        self.stop_calls
    }

    /// Number of `scan` calls.
    #[must_use]
    pub const fn scan_calls(&self) -> usize {
        self.scan_calls
    }

    /// Returns `true` between `start` and `stop`.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }
}

#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
impl ScanSource for MockScanner {
    async fn start(&mut self) -> BluetoothResult<()> {
        self.start_calls += 1;
        if self.fail_start {
            return Err(BluetoothError::AdapterNotFound);
        }
        self.started = true;
        Ok(())
    }

    async fn scan(&mut self) -> BluetoothResult<Vec<DeviceObservation>> {
        if !self.started {
            return Err(BluetoothError::NotStarted);
        }
        self.scan_calls += 1;
        match (self.script.pop_front(), &self.when_exhausted) {
            (Some(snapshot), _) => Ok(snapshot),
            (None, WhenExhausted::RepeatEmpty) => Ok(Vec::new()),
            (None, WhenExhausted::Fail(message)) => Err(BluetoothError::DiscoveryFailed {
                message: message.clone(),
            }),
        }
    }

    async fn stop(&mut self) -> BluetoothResult<()> {
        self.stop_calls += 1;
        self.started = false;
        Ok(())
    }
}
