use crate::clock::{Clock, SystemClock};
use crate::device::{Device, DeviceType, DiscoveryEvent, MacAddress};
use crate::math::geometry::{mac_to_angle, mac_to_elevation, rssi_to_distance};
use crate::prelude::EngineConfig;
use crate::registry::history::RssiRing;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Per-type device totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounts {
    pub ble: usize,
    pub classic: usize,
    pub wifi: usize,
}

impl TypeCounts {
    pub fn tally<'a>(devices: impl IntoIterator<Item = &'a Device>) -> Self {
        devices.into_iter().fold(Self::default(), |mut counts, device| {
            match device.kind {
                DeviceType::Ble => counts.ble += 1,
                DeviceType::Classic => counts.classic += 1,
                DeviceType::WiFi => counts.wifi += 1,
            }
            counts
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct SignalModel {
    alpha: f64,
    measured_power: f64,
    path_loss_exponent: f64,
    history_capacity: usize,
}

#[derive(Default)]
struct RegistryState {
    devices: HashMap<MacAddress, Device>,
    history: HashMap<MacAddress, RssiRing>,
}

/// Authoritative set of live devices.
///
/// Devices and their signal histories share one readers-writer lock, so a
/// reader never observes a half-applied upsert.
pub struct DeviceRegistry {
    state: RwLock<RegistryState>,
    model: SignalModel,
    clock: Arc<dyn Clock>,
}

impl DeviceRegistry {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            model: SignalModel {
                alpha: config.smoothing_alpha,
                measured_power: config.measured_power,
                path_loss_exponent: config.path_loss_exponent,
                history_capacity: config.history_capacity,
            },
            clock,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Creates or refreshes a device from one observation.
    ///
    /// Existing devices keep their bearing, elevation and type; RSSI is
    /// EMA-smoothed and the name is only filled while still empty.
    pub fn upsert(
        &self,
        mac: &MacAddress,
        name: &str,
        rssi: f64,
        kind: DeviceType,
        frequency: u32,
        channel: u32,
    ) {
        let now = self.clock.now();
        let model = self.model;
        let mut state = self.write();

        state
            .history
            .entry(mac.clone())
            .or_insert_with(|| RssiRing::with_capacity(model.history_capacity))
            .push(rssi);

        if let Some(existing) = state.devices.get_mut(mac) {
            existing.rssi = model.alpha * rssi + (1.0 - model.alpha) * existing.rssi;
            existing.distance = rssi_to_distance(
                existing.rssi,
                model.measured_power,
                model.path_loss_exponent,
            );
            existing.last_seen = now;
            if existing.name.is_empty() && !name.is_empty() {
                existing.name = name.to_string();
            }
            if frequency != 0 {
                existing.frequency = frequency;
            }
            if channel != 0 {
                existing.channel = channel;
            }
            return;
        }

        let device = Device {
            mac: mac.clone(),
            name: name.to_string(),
            rssi,
            kind,
            last_seen: now,
            angle: mac_to_angle(mac),
            distance: rssi_to_distance(rssi, model.measured_power, model.path_loss_exponent),
            elevation: mac_to_elevation(mac),
            frequency,
            channel,
        };
        state.devices.insert(mac.clone(), device);
    }

    /// Fills the name of a live device without touching its signal or age.
    /// Returns false when the device is unknown.
    pub fn fill_name(&self, mac: &MacAddress, name: &str) -> bool {
        let mut state = self.write();
        match state.devices.get_mut(mac) {
            Some(device) => {
                if device.name.is_empty() && !name.is_empty() {
                    device.name = name.to_string();
                }
                true
            }
            None => false,
        }
    }

    /// Routes an event to `upsert` or `fill_name`. Returns whether it was applied.
    pub fn apply(&self, event: &DiscoveryEvent) -> bool {
        match event.rssi {
            Some(rssi) => {
                self.upsert(
                    &event.mac,
                    &event.name,
                    rssi,
                    event.kind,
                    event.frequency,
                    event.channel,
                );
                true
            }
            None => self.fill_name(&event.mac, &event.name),
        }
    }

    /// Drops every device last seen before `now - timeout`, with its history.
    pub fn evict(&self, timeout: Duration) -> usize {
        self.evict_stale(timeout).len()
    }

    /// Like [`DeviceRegistry::evict`], but reports which MACs were dropped.
    pub fn evict_stale(&self, timeout: Duration) -> Vec<MacAddress> {
        let now = self.clock.now();
        let mut state = self.write();
        let RegistryState { devices, history } = &mut *state;
        let stale: Vec<MacAddress> = devices
            .values()
            .filter(|device| now.saturating_duration_since(device.last_seen) > timeout)
            .map(|device| device.mac.clone())
            .collect();
        for mac in &stale {
            devices.remove(mac);
            history.remove(mac);
        }
        stale
    }

    /// Independent copy of all devices, strongest signal first.
    pub fn snapshot(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.read().devices.values().cloned().collect();
        devices.sort_by(|a, b| {
            b.rssi
                .total_cmp(&a.rssi)
                .then_with(|| a.mac.cmp(&b.mac))
        });
        devices
    }

    pub fn get(&self, mac: &MacAddress) -> Option<Device> {
        self.read().devices.get(mac).cloned()
    }

    pub fn history(&self, mac: &MacAddress) -> Vec<f64> {
        self.read()
            .history
            .get(mac)
            .map(RssiRing::values)
            .unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.read().devices.len()
    }

    pub fn count_by_type(&self) -> TypeCounts {
        TypeCounts::tally(self.read().devices.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use approx::assert_relative_eq;
    use std::thread;

    fn mac(raw: &str) -> MacAddress {
        MacAddress::parse(raw).unwrap()
    }

    fn registry_with_clock() -> (DeviceRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let registry = DeviceRegistry::with_clock(&EngineConfig::default(), clock.clone());
        (registry, clock)
    }

    #[test]
    fn second_observation_is_ema_smoothed() {
        let (registry, _) = registry_with_clock();
        let id = mac("AA:BB:CC:DD:EE:FF");
        registry.upsert(&id, "", -70.0, DeviceType::Ble, 0, 0);
        registry.upsert(&id, "", -50.0, DeviceType::Ble, 0, 0);
        let device = registry.get(&id).unwrap();
        assert_relative_eq!(device.rssi, 0.3 * -50.0 + 0.7 * -70.0, epsilon = 1e-9);
        assert_relative_eq!(
            device.distance,
            rssi_to_distance(device.rssi, -59.0, 2.5),
            epsilon = 1e-9
        );
    }

    #[test]
    fn bearing_and_elevation_never_move() {
        let (registry, _) = registry_with_clock();
        let id = mac("10:20:30:40:50:60");
        registry.upsert(&id, "", -80.0, DeviceType::Ble, 0, 0);
        let first = registry.snapshot()[0].clone();
        for step in 0..50 {
            registry.upsert(&id, "", -40.0 - step as f64, DeviceType::Classic, 0, 0);
            let current = &registry.snapshot()[0];
            assert_eq!(current.angle, first.angle);
            assert_eq!(current.elevation, first.elevation);
            assert_eq!(current.kind, DeviceType::Ble);
        }
    }

    #[test]
    fn names_fill_once_and_are_kept() {
        let (registry, _) = registry_with_clock();
        let id = mac("AA:BB:CC:DD:EE:01");
        registry.upsert(&id, "", -60.0, DeviceType::Ble, 0, 0);
        registry.upsert(&id, "Pixel 9", -60.0, DeviceType::Ble, 0, 0);
        registry.upsert(&id, "", -60.0, DeviceType::Ble, 0, 0);
        registry.upsert(&id, "Other", -60.0, DeviceType::Ble, 0, 0);
        assert_eq!(registry.get(&id).unwrap().name, "Pixel 9");
    }

    #[test]
    fn name_only_events_leave_signal_untouched() {
        let (registry, _) = registry_with_clock();
        let id = mac("AA:BB:CC:DD:EE:02");
        registry.upsert(&id, "", -55.0, DeviceType::Ble, 0, 0);
        assert!(registry.apply(&DiscoveryEvent::name_only(id.clone(), "Watch", DeviceType::Ble)));
        let device = registry.get(&id).unwrap();
        assert_eq!(device.name, "Watch");
        assert_eq!(device.rssi, -55.0);
        assert_eq!(registry.history(&id), vec![-55.0]);

        let unknown = mac("AA:BB:CC:DD:EE:03");
        assert!(!registry.apply(&DiscoveryEvent::name_only(unknown.clone(), "Ghost", DeviceType::Ble)));
        assert!(registry.get(&unknown).is_none());
    }

    #[test]
    fn snapshot_is_sorted_strongest_first() {
        let (registry, _) = registry_with_clock();
        for (idx, rssi) in [-80.0, -45.0, -90.0, -60.0, -45.0].iter().enumerate() {
            let id = mac(&format!("00:00:00:00:00:{:02X}", idx));
            registry.upsert(&id, "", *rssi, DeviceType::Ble, 0, 0);
        }
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 5);
        assert!(snapshot.windows(2).all(|w| w[0].rssi >= w[1].rssi));
    }

    #[test]
    fn evict_removes_only_stale_devices() {
        let (registry, clock) = registry_with_clock();
        let stale = mac("AA:00:00:00:00:01");
        let fresh = mac("AA:00:00:00:00:02");
        registry.upsert(&stale, "", -60.0, DeviceType::Ble, 0, 0);
        clock.advance(Duration::from_secs(20));
        registry.upsert(&fresh, "", -60.0, DeviceType::WiFi, 2437, 6);
        clock.advance(Duration::from_secs(15));

        let before = registry.count();
        let evicted = registry.evict(Duration::from_secs(30));
        assert_eq!(evicted, 1);
        assert_eq!(registry.count(), before - evicted);
        assert!(registry.get(&stale).is_none());
        assert!(registry.history(&stale).is_empty());
        let kept = registry.get(&fresh).unwrap();
        assert_eq!((kept.frequency, kept.channel), (2437, 6));
    }

    #[test]
    fn evict_stale_names_the_dropped_macs() {
        let (registry, clock) = registry_with_clock();
        let gone = mac("AA:00:00:00:00:07");
        registry.upsert(&gone, "", -60.0, DeviceType::Ble, 0, 0);
        clock.advance(Duration::from_secs(25));
        registry.upsert(&mac("AA:00:00:00:00:08"), "", -60.0, DeviceType::Ble, 0, 0);
        clock.advance(Duration::from_secs(10));

        assert_eq!(registry.evict_stale(Duration::from_secs(30)), vec![gone]);
        assert!(registry.evict_stale(Duration::from_secs(30)).is_empty());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn upsert_then_evict_end_to_end() {
        let (registry, clock) = registry_with_clock();
        let id = mac("AA:BB:CC:DD:EE:FF");
        registry.upsert(&id, "", -70.0, DeviceType::Ble, 0, 0);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_relative_eq!(
            snapshot[0].distance,
            rssi_to_distance(-70.0, -59.0, 2.5),
            epsilon = 1e-9
        );

        clock.advance(Duration::from_secs(31));
        assert_eq!(registry.evict(Duration::from_secs(30)), 1);
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn counts_by_type() {
        let (registry, _) = registry_with_clock();
        registry.upsert(&mac("01:00:00:00:00:00"), "", -60.0, DeviceType::Ble, 0, 0);
        registry.upsert(&mac("02:00:00:00:00:00"), "", -60.0, DeviceType::Classic, 0, 0);
        registry.upsert(&mac("03:00:00:00:00:00"), "", -60.0, DeviceType::WiFi, 5180, 36);
        registry.upsert(&mac("04:00:00:00:00:00"), "", -60.0, DeviceType::WiFi, 2412, 1);
        assert_eq!(registry.count(), 4);
        assert_eq!(
            registry.count_by_type(),
            TypeCounts {
                ble: 1,
                classic: 1,
                wifi: 2
            }
        );
    }

    #[test]
    fn concurrent_writers_and_readers_agree() {
        let registry = Arc::new(DeviceRegistry::new(&EngineConfig::default()));
        let writers: Vec<_> = (0..4)
            .map(|worker| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for idx in 0..50u32 {
                        let id = mac(&format!("{:02X}:00:00:00:00:{:02X}", worker, idx));
                        registry.upsert(&id, "", -60.0 - idx as f64 / 10.0, DeviceType::Ble, 0, 0);
                    }
                })
            })
            .collect();
        let reader = {
            let registry = registry.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    let snapshot = registry.snapshot();
                    assert!(snapshot.windows(2).all(|w| w[0].rssi >= w[1].rssi));
                }
            })
        };
        for handle in writers {
            handle.join().unwrap();
        }
        reader.join().unwrap();
        assert_eq!(registry.count(), 200);
    }
}
