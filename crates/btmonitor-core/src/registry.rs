//! Presence registry: the set of devices currently being tracked.
//!
//! Keyed by address, so each address has at most one [`TrackedDevice`].
//! The registry is owned by the debounce engine and is not shared.

use std::collections::btree_map::{BTreeMap, Iter};
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::types::{DeviceObservation, Signal};

/// Tracked state for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedDevice {
    /// Device address, the registry key.
    pub address: String,

    /// Name captured when the device was found (empty if unknown).
    pub name: String,

    /// Signal captured when the device was found.
    pub signal: Signal,

    /// Consecutive scans in which the device was absent. Zero while visible.
    pub miss_count: u32,

    /// When the device entered the registry.
    pub first_seen: DateTime<Utc>,
}

impl TrackedDevice {
    /// Start tracking a freshly observed device.
    #[must_use]
    pub fn from_observation(observation: &DeviceObservation, now: DateTime<Utc>) -> Self {
        Self {
            address: observation.address.clone(),
            name: observation.name_or_default(),
            signal: observation.signal_or_default(),
            miss_count: 0,
            first_seen: now,
        }
    }

    /// Returns `true` while the device is visible in the latest scan.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.miss_count == 0
    }
}

/// Address-keyed store of tracked devices.
///
/// Iteration is in address order.
#[derive(Debug, Clone, Default)]
pub struct PresenceRegistry {
    devices: BTreeMap<String, TrackedDevice>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a device by address.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<&TrackedDevice> {
        self.devices.get(address)
    }

    /// Look up a device for in-place update.
    pub fn get_mut(&mut self, address: &str) -> Option<&mut TrackedDevice> {
        self.devices.get_mut(address)
    }

    /// Insert a device, replacing any entry with the same address.
    pub fn put(&mut self, address: impl Into<String>, device: TrackedDevice) {
        self.devices.insert(address.into(), device);
    }

    /// Remove a device. Does nothing if the address is not tracked.
    pub fn remove(&mut self, address: &str) -> Option<TrackedDevice> {
        self.devices.remove(address)
    }

    /// Snapshot of the tracked addresses.
    #[must_use]
    pub fn addresses(&self) -> BTreeSet<String> {
        self.devices.keys().cloned().collect()
    }

    /// Returns `true` if the address is tracked.
    #[must_use]
    pub fn contains(&self, address: &str) -> bool {
        self.devices.contains_key(address)
    }

    /// Number of tracked devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns `true` if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Iterate over tracked devices in address order.
    pub fn iter(&self) -> Iter<'_, String, TrackedDevice> {
        self.devices.iter()
    }
}

impl<'a> IntoIterator for &'a PresenceRegistry {
    type Item = (&'a String, &'a TrackedDevice);
    type IntoIter = Iter<'a, String, TrackedDevice>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(address: &str) -> TrackedDevice {
        TrackedDevice::from_observation(
            &DeviceObservation::new(address).with_name("Phone"),
            Utc::now(),
        )
    }

    #[test]
    fn test_put_overwrites_same_address() {
        let mut registry = PresenceRegistry::new();
        registry.put("AA", device("AA"));

        let mut replacement = device("AA");
        replacement.miss_count = 2;
        registry.put("AA", replacement);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("AA").unwrap().miss_count, 2);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut registry = PresenceRegistry::new();
        registry.put("AA", device("AA"));

        assert!(registry.remove("BB").is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.remove("AA").is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_addresses_is_a_snapshot() {
        let mut registry = PresenceRegistry::new();
        registry.put("BB", device("BB"));
        registry.put("AA", device("AA"));

        let addresses = registry.addresses();
        registry.remove("AA");

        assert_eq!(
            addresses.into_iter().collect::<Vec<_>>(),
            vec!["AA".to_string(), "BB".to_string()]
        );
        assert!(!registry.contains("AA"));
    }

    #[test]
    fn test_update_in_place() {
        let mut registry = PresenceRegistry::new();
        registry.put("AA", device("AA"));

        registry.get_mut("AA").unwrap().miss_count += 1;

        let tracked = registry.get("AA").unwrap();
        assert_eq!(tracked.miss_count, 1);
        assert!(!tracked.is_visible());
    }

    #[test]
    fn test_missing_metadata_uses_sentinels() {
        let tracked = TrackedDevice::from_observation(&DeviceObservation::new("CC"), Utc::now());
        assert_eq!(tracked.name, "");
        assert_eq!(tracked.signal, Signal::Unknown);
        assert!(tracked.is_visible());
    }
}
