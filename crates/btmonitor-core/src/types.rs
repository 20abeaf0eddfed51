//! Shared types for scan snapshots and presence events.
//!
//! A scan produces a snapshot of [`DeviceObservation`]s; the debounce engine
//! turns those into [`PresenceEvent`]s, which serialize to the structured
//! event record written by the event sink:
//!
//! ```json
//! {"address":"AA:BB:CC:DD:EE:FF","name":"Pixel 8","rssi":-61,"timestamp":"2025-01-15 03:30:00","status":"FOUND"}
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Literal written in place of an unknown signal strength.
pub const UNKNOWN_SIGNAL: &str = "N/A";

/// Timestamp format used in event records (always UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Signal strength indicator reported by the scan source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Signal {
    /// Received signal strength in dBm.
    Dbm(i16),
    /// The scan did not report a signal strength.
    #[default]
    Unknown,
}

impl Signal {
    /// Returns the signal strength in dBm, if known.
    #[must_use]
    pub const fn dbm(self) -> Option<i16> {
        match self {
            Self::Dbm(value) => Some(value),
            Self::Unknown => None,
        }
    }

    /// Returns `true` if the scan reported no signal strength.
    #[must_use]
    pub const fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl From<Option<i16>> for Signal {
    fn from(value: Option<i16>) -> Self {
        value.map_or(Self::Unknown, Self::Dbm)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dbm(value) => write!(f, "{value} dBm"),
            Self::Unknown => f.write_str(UNKNOWN_SIGNAL),
        }
    }
}

impl Serialize for Signal {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Dbm(value) => serializer.serialize_i16(*value),
            Self::Unknown => serializer.serialize_str(UNKNOWN_SIGNAL),
        }
    }
}

/// One device reported by a single scan invocation.
///
/// Name and signal are optional; the scan source is not required to
/// report either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceObservation {
    /// Stable device address (for Bluetooth, the MAC address as reported).
    pub address: String,

    /// Advertised device name, if any.
    pub name: Option<String>,

    /// Signal strength, if reported.
    pub signal: Option<Signal>,
}

impl DeviceObservation {
    /// Create an observation carrying only an address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            signal: None,
        }
    }

    /// Attach an advertised name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a signal strength in dBm.
    #[must_use]
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.signal = Some(Signal::Dbm(rssi));
        self
    }

    /// The name to record, with the empty string standing in for "unknown".
    #[must_use]
    pub fn name_or_default(&self) -> String {
        self.name.clone().unwrap_or_default()
    }

    /// The signal to record, with [`Signal::Unknown`] standing in for "unknown".
    #[must_use]
    pub fn signal_or_default(&self) -> Signal {
        self.signal.unwrap_or_default()
    }
}

/// Presence transition carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PresenceStatus {
    /// The device was seen for the first time (or again after being lost).
    Found,
    /// The device has been absent for the configured number of scans.
    Lost,
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found => f.write_str("FOUND"),
            Self::Lost => f.write_str("LOST"),
        }
    }
}

/// A presence change for one device.
///
/// Serializes to the structured event record. Field order is part of the
/// record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceEvent {
    /// Device address.
    pub address: String,

    /// Last known device name (empty if never reported).
    pub name: String,

    /// Last known signal strength.
    pub rssi: Signal,

    /// When the transition was detected (UTC).
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,

    /// FOUND or LOST.
    pub status: PresenceStatus,
}

impl PresenceEvent {
    /// The timestamp rendered as it appears in the event record.
    #[must_use]
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

fn serialize_timestamp<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&timestamp.format(TIMESTAMP_FORMAT))
}
