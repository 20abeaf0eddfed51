//! Debounced presence tracking.
//!
//! Scans are unreliable: a device that is still nearby can be missing from
//! any single snapshot. The [`DebounceEngine`] only reports a device as
//! LOST after it has been absent from `not_detected_limit` consecutive
//! scans, and reports FOUND the first time an untracked address shows up.
//!
//! Each call to [`DebounceEngine::cycle`] runs three phases in order:
//!
//! 1. **Evict** - drop the devices that went LOST in the previous cycle.
//! 2. **Observe** - track new addresses (FOUND) and reset the miss count
//!    of known ones.
//! 3. **Miss** - bump the miss count of every tracked address absent from
//!    the snapshot, emitting LOST when it reaches the limit.
//!
//! Eviction lags the LOST event by one cycle, so a device that went LOST
//! is still readable from the registry until the next cycle starts.

use std::collections::HashSet;
use std::num::NonZeroU32;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::registry::{PresenceRegistry, TrackedDevice};
use crate::types::{DeviceObservation, PresenceEvent, PresenceStatus};

/// Default number of consecutive missed scans before a device is LOST.
pub const DEFAULT_NOT_DETECTED_LIMIT: NonZeroU32 = match NonZeroU32::new(3) {
    Some(limit) => limit,
    None => unreachable!(),
};

/// How name and signal are maintained for a device that stays visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataPolicy {
    /// Keep the values captured at FOUND time for the whole presence
    /// period. Event consumers see stable values.
    #[default]
    CaptureOnce,
    /// Overwrite name and signal with any known value from later sightings.
    RefreshOnSighting,
}

/// Tunables for the debounce engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebouncePolicy {
    /// Consecutive missed scans that make a device LOST.
    pub not_detected_limit: NonZeroU32,

    /// Name/signal maintenance policy.
    pub metadata: MetadataPolicy,
}

impl Default for DebouncePolicy {
    fn default() -> Self {
        Self {
            not_detected_limit: DEFAULT_NOT_DETECTED_LIMIT,
            metadata: MetadataPolicy::default(),
        }
    }
}

impl DebouncePolicy {
    /// Policy with the given limit and metadata captured once.
    #[must_use]
    pub fn with_limit(not_detected_limit: NonZeroU32) -> Self {
        Self {
            not_detected_limit,
            ..Self::default()
        }
    }

    /// Set the metadata policy.
    #[must_use]
    pub fn metadata(mut self, metadata: MetadataPolicy) -> Self {
        self.metadata = metadata;
        self
    }

    const fn limit(&self) -> u32 {
        self.not_detected_limit.get()
    }
}

/// State machine turning scan snapshots into FOUND/LOST events.
///
/// Owns the [`PresenceRegistry`]. Performs no I/O and never fails; the
/// clock is passed in so cycles are deterministic.
#[derive(Debug, Clone, Default)]
pub struct DebounceEngine {
    policy: DebouncePolicy,
    registry: PresenceRegistry,
    pending_eviction: Vec<String>,
}

impl DebounceEngine {
    /// Create an engine with an empty registry.
    #[must_use]
    pub fn new(policy: DebouncePolicy) -> Self {
        Self::with_registry(policy, PresenceRegistry::new())
    }

    /// Create an engine starting from an existing registry.
    #[must_use]
    pub const fn with_registry(policy: DebouncePolicy, registry: PresenceRegistry) -> Self {
        Self {
            policy,
            registry,
            pending_eviction: Vec::new(),
        }
    }

    /// The active policy.
    #[must_use]
    pub const fn policy(&self) -> &DebouncePolicy {
        &self.policy
    }

    /// The tracked devices.
    #[must_use]
    pub const fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    /// Addresses that went LOST this cycle and will be evicted next cycle.
    #[must_use]
    pub fn pending_eviction(&self) -> &[String] {
        &self.pending_eviction
    }

    /// Process one scan snapshot and return the resulting events.
    ///
    /// FOUND events are in snapshot order, LOST events in address order.
    pub fn cycle(&mut self, snapshot: &[DeviceObservation], now: DateTime<Utc>) -> Vec<PresenceEvent> {
        self.evict();

        let mut events = Vec::new();
        let mut observed: HashSet<&str> = HashSet::with_capacity(snapshot.len());

        for observation in snapshot {
            observed.insert(observation.address.as_str());
            if let Some(event) = self.observe(observation, now) {
                events.push(event);
            }
        }

        for address in self.registry.addresses() {
            if observed.contains(address.as_str()) {
                continue;
            }
            if let Some(event) = self.miss(&address, now) {
                events.push(event);
            }
        }

        events
    }

    fn evict(&mut self) {
        for address in self.pending_eviction.drain(..) {
            self.registry.remove(&address);
        }
    }

    fn observe(&mut self, observation: &DeviceObservation, now: DateTime<Utc>) -> Option<PresenceEvent> {
        let limit = self.policy.limit();
        let refresh = self.policy.metadata == MetadataPolicy::RefreshOnSighting;

        if let Some(tracked) = self
            .registry
            .get_mut(&observation.address)
            .filter(|tracked| tracked.miss_count < limit)
        {
            tracked.miss_count = 0;
            if refresh {
                refresh_metadata(tracked, observation);
            }
            return None;
        }

        let tracked = TrackedDevice::from_observation(observation, now);
        let event = presence_event(&tracked, PresenceStatus::Found, now);
        self.registry.put(observation.address.clone(), tracked);
        Some(event)
    }

    fn miss(&mut self, address: &str, now: DateTime<Utc>) -> Option<PresenceEvent> {
        let limit = self.policy.limit();
        let tracked = self.registry.get_mut(address)?;

        // At or past the limit without being pending: its LOST was already
        // emitted, so drop it without another event.
        if tracked.miss_count >= limit {
            debug!(address, miss_count = tracked.miss_count, "Dropping stale entry");
            self.registry.remove(address);
            return None;
        }

        tracked.miss_count += 1;
        if tracked.miss_count != limit {
            return None;
        }

        let event = presence_event(tracked, PresenceStatus::Lost, now);
        self.pending_eviction.push(address.to_string());
        Some(event)
    }
}

fn refresh_metadata(tracked: &mut TrackedDevice, observation: &DeviceObservation) {
    if let Some(name) = observation.name.as_deref().filter(|name| !name.is_empty()) {
        name.clone_into(&mut tracked.name);
    }
    if let Some(signal) = observation.signal.filter(|signal| !signal.is_unknown()) {
        tracked.signal = signal;
    }
}

fn presence_event(tracked: &TrackedDevice, status: PresenceStatus, now: DateTime<Utc>) -> PresenceEvent {
    PresenceEvent {
        address: tracked.address.clone(),
        name: tracked.name.clone(),
        rssi: tracked.signal,
        timestamp: now,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Signal;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 3, minute, 0).unwrap()
    }

    fn obs(address: &str) -> DeviceObservation {
        DeviceObservation::new(address)
    }

    fn limit(value: u32) -> NonZeroU32 {
        NonZeroU32::new(value).unwrap()
    }

    fn statuses(events: &[PresenceEvent]) -> Vec<(&str, PresenceStatus)> {
        events
            .iter()
            .map(|event| (event.address.as_str(), event.status))
            .collect()
    }

    #[test]
    fn test_first_sighting_emits_found() {
        let mut engine = DebounceEngine::default();
        let events = engine.cycle(&[obs("A").with_name("Phone").with_rssi(-50)], at(0));

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.status, PresenceStatus::Found);
        assert_eq!(event.name, "Phone");
        assert_eq!(event.rssi, Signal::Dbm(-50));
        assert_eq!(event.timestamp, at(0));
        assert_eq!(engine.registry().get("A").unwrap().miss_count, 0);
    }

    #[test]
    fn test_same_snapshot_twice_is_idempotent() {
        let mut engine = DebounceEngine::default();
        engine.cycle(&[obs("A")], at(0));

        assert!(engine.cycle(&[obs("A")], at(1)).is_empty());
        assert_eq!(engine.registry().len(), 1);
    }

    #[test]
    fn test_duplicate_address_in_snapshot_found_once() {
        let mut engine = DebounceEngine::default();
        let events = engine.cycle(&[obs("A"), obs("A")], at(0));

        assert_eq!(statuses(&events), vec![("A", PresenceStatus::Found)]);
    }

    #[test]
    fn test_misses_below_limit_are_silent() {
        let mut engine = DebounceEngine::new(DebouncePolicy::with_limit(limit(4)));
        engine.cycle(&[obs("A")], at(0));

        for cycle in 1..=3 {
            assert!(engine.cycle(&[], at(cycle)).is_empty());
            assert_eq!(engine.registry().get("A").unwrap().miss_count, cycle);
        }
    }

    #[test]
    fn test_lost_then_evicted_next_cycle() {
        let mut engine = DebounceEngine::default();
        engine.cycle(&[obs("A").with_name("Phone")], at(0));
        engine.cycle(&[], at(1));
        engine.cycle(&[], at(2));

        let events = engine.cycle(&[], at(3));
        assert_eq!(statuses(&events), vec![("A", PresenceStatus::Lost)]);
        assert_eq!(events[0].name, "Phone");

        // Still readable in the cycle that emitted LOST.
        assert_eq!(engine.registry().get("A").unwrap().miss_count, 3);
        assert_eq!(engine.pending_eviction(), ["A".to_string()]);

        assert!(engine.cycle(&[], at(4)).is_empty());
        assert!(!engine.registry().contains("A"));
        assert!(engine.pending_eviction().is_empty());
    }

    #[test]
    fn test_documented_scenario() {
        let mut engine = DebounceEngine::default();

        assert_eq!(
            statuses(&engine.cycle(&[obs("A")], at(1))),
            vec![("A", PresenceStatus::Found)]
        );
        assert!(engine.cycle(&[], at(2)).is_empty());
        assert_eq!(engine.registry().get("A").unwrap().miss_count, 1);
        assert!(engine.cycle(&[], at(3)).is_empty());
        assert_eq!(engine.registry().get("A").unwrap().miss_count, 2);
        assert_eq!(
            statuses(&engine.cycle(&[], at(4))),
            vec![("A", PresenceStatus::Lost)]
        );

        let events = engine.cycle(&[obs("A")], at(5));
        assert_eq!(statuses(&events), vec![("A", PresenceStatus::Found)]);
        assert_eq!(events[0].timestamp, at(5));
        assert_eq!(engine.registry().get("A").unwrap().first_seen, at(5));
    }

    #[test]
    fn test_intermittent_device_never_lost() {
        let mut engine = DebounceEngine::default();
        let pattern = [true, false, false, true, false, true, false, false, true, false];

        let mut all = engine.cycle(&[obs("A")], at(0));
        for (minute, present) in (1..).zip(pattern) {
            let snapshot = if present { vec![obs("A")] } else { Vec::new() };
            all.extend(engine.cycle(&snapshot, at(minute)));
        }

        assert_eq!(statuses(&all), vec![("A", PresenceStatus::Found)]);
    }

    #[test]
    fn test_reappearance_resets_miss_count_without_event() {
        let mut engine = DebounceEngine::default();
        engine.cycle(&[obs("A")], at(0));
        engine.cycle(&[], at(1));
        engine.cycle(&[], at(2));

        assert!(engine.cycle(&[obs("A")], at(3)).is_empty());
        assert_eq!(engine.registry().get("A").unwrap().miss_count, 0);
    }

    #[test]
    fn test_snapshot_order_does_not_matter() {
        let mut forward = DebounceEngine::default();
        let mut reverse = DebounceEngine::default();

        forward.cycle(&[obs("A"), obs("B"), obs("C")], at(0));
        reverse.cycle(&[obs("C"), obs("B"), obs("A")], at(0));

        for minute in 1..=3 {
            let a = forward.cycle(&[obs("B")], at(minute));
            let b = reverse.cycle(&[obs("B")], at(minute));
            assert_eq!(a, b);
        }
        assert_eq!(forward.registry().addresses(), reverse.registry().addresses());
    }

    #[test]
    fn test_lost_events_in_address_order() {
        let mut engine = DebounceEngine::new(DebouncePolicy::with_limit(limit(1)));
        engine.cycle(&[obs("C"), obs("A"), obs("B")], at(0));

        let events = engine.cycle(&[], at(1));
        assert_eq!(
            statuses(&events),
            vec![
                ("A", PresenceStatus::Lost),
                ("B", PresenceStatus::Lost),
                ("C", PresenceStatus::Lost),
            ]
        );
    }

    #[test]
    fn test_capture_once_keeps_first_metadata() {
        let mut engine = DebounceEngine::new(DebouncePolicy::with_limit(limit(1)));
        engine.cycle(&[obs("A").with_name("Old").with_rssi(-80)], at(0));
        engine.cycle(&[obs("A").with_name("New").with_rssi(-40)], at(1));

        let events = engine.cycle(&[], at(2));
        assert_eq!(events[0].name, "Old");
        assert_eq!(events[0].rssi, Signal::Dbm(-80));
    }

    #[test]
    fn test_refresh_policy_updates_known_metadata() {
        let policy = DebouncePolicy::with_limit(limit(1)).metadata(MetadataPolicy::RefreshOnSighting);
        let mut engine = DebounceEngine::new(policy);
        engine.cycle(&[obs("A").with_name("Old").with_rssi(-80)], at(0));
        engine.cycle(&[obs("A").with_rssi(-40)], at(1));

        let events = engine.cycle(&[], at(2));
        assert_eq!(events[0].name, "Old");
        assert_eq!(events[0].rssi, Signal::Dbm(-40));
    }

    #[test]
    fn test_over_limit_entry_is_dropped_silently() {
        for miss_count in [3, 7] {
            let mut registry = PresenceRegistry::new();
            let mut stale = TrackedDevice::from_observation(&obs("A"), at(0));
            stale.miss_count = miss_count;
            registry.put("A", stale);

            let mut engine = DebounceEngine::with_registry(DebouncePolicy::default(), registry);
            assert!(engine.cycle(&[], at(1)).is_empty());
            assert!(engine.registry().is_empty());
            assert!(engine.pending_eviction().is_empty());
        }
    }

    #[test]
    fn test_over_limit_entry_observed_is_found_again() {
        for miss_count in [3, 5] {
            let mut registry = PresenceRegistry::new();
            let mut stale = TrackedDevice::from_observation(&obs("A"), at(0));
            stale.miss_count = miss_count;
            registry.put("A", stale);

            let mut engine = DebounceEngine::with_registry(DebouncePolicy::default(), registry);
            let events = engine.cycle(&[obs("A")], at(1));

            assert_eq!(statuses(&events), vec![("A", PresenceStatus::Found)]);
            assert_eq!(engine.registry().get("A").unwrap().miss_count, 0);
        }
    }

    #[test]
    fn test_entry_one_below_limit_goes_lost() {
        let mut registry = PresenceRegistry::new();
        let mut tracked = TrackedDevice::from_observation(&obs("A"), at(0));
        tracked.miss_count = 2;
        registry.put("A", tracked);

        let mut engine = DebounceEngine::with_registry(DebouncePolicy::default(), registry);
        let events = engine.cycle(&[], at(1));

        assert_eq!(statuses(&events), vec![("A", PresenceStatus::Lost)]);
        assert_eq!(engine.pending_eviction(), ["A".to_string()]);
    }

    #[test]
    fn test_lost_fires_exactly_once() {
        let mut engine = DebounceEngine::default();
        engine.cycle(&[obs("A")], at(0));

        let lost: usize = (1..20)
            .map(|minute| {
                engine
                    .cycle(&[], at(minute))
                    .iter()
                    .filter(|event| event.status == PresenceStatus::Lost)
                    .count()
            })
            .sum();
        assert_eq!(lost, 1);
    }
}
