use crate::device::MacAddress;
use crate::math::geometry::{angle_diff, mac_digest};
use crate::prelude::EngineError;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_4;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

const COMPASS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Radio family a device was discovered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    Ble,
    Classic,
    WiFi,
}

impl DeviceType {
    /// Radar marker glyph.
    pub fn symbol(self) -> char {
        match self {
            DeviceType::Ble => '*',
            DeviceType::Classic => 'B',
            DeviceType::WiFi => 'W',
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeviceType::Ble => "BLE",
            DeviceType::Classic => "Classic",
            DeviceType::WiFi => "WiFi",
        };
        f.write_str(label)
    }
}

/// Accepts `ble`, `classic` and `wifi` in any case.
impl FromStr for DeviceType {
    type Err = EngineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ble" => Ok(DeviceType::Ble),
            "classic" => Ok(DeviceType::Classic),
            "wifi" => Ok(DeviceType::WiFi),
            other => Err(EngineError::MalformedRecord(format!("unknown device type {:?}", other))),
        }
    }
}

/// One tracked emitter as held by the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub mac: MacAddress,
    pub name: String,
    /// Smoothed signal strength (dBm).
    pub rssi: f64,
    pub kind: DeviceType,
    pub last_seen: Instant,
    /// Bearing in radians, 0 = north, clockwise. Fixed for the device lifetime.
    pub angle: f64,
    /// Estimated distance in meters.
    pub distance: f64,
    /// [-1, 1], fixed for the device lifetime.
    pub elevation: f64,
    /// MHz, zero outside Wi-Fi.
    pub frequency: u32,
    pub channel: u32,
}

impl Device {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "[unnamed]"
        } else {
            &self.name
        }
    }

    pub fn band(&self) -> &'static str {
        if self.frequency >= 5000 {
            "5G"
        } else if self.frequency >= 2400 {
            "2.4G"
        } else {
            ""
        }
    }

    /// Nearest of the eight compass points to the bearing.
    pub fn direction(&self) -> &'static str {
        let offset = |idx: usize| angle_diff(self.angle, idx as f64 * FRAC_PI_4);
        (0..COMPASS.len())
            .min_by(|a, b| offset(*a).total_cmp(&offset(*b)))
            .map_or(COMPASS[0], |idx| COMPASS[idx])
    }

    pub fn elevation_label(&self) -> &'static str {
        if self.elevation > 0.2 {
            "above"
        } else if self.elevation < -0.2 {
            "below"
        } else {
            "level"
        }
    }

    /// Short radar label: the name cut to `max_len` characters, or a
    /// hash-derived tag such as `#A3F` for unnamed devices.
    pub fn callsign(&self, max_len: usize) -> String {
        if self.name.is_empty() {
            let digest = mac_digest(&self.mac);
            format!("#{:02X}{:X}", digest[0], digest[1] & 0x0F)
        } else {
            self.name.chars().take(max_len).collect()
        }
    }
}

/// A single observation emitted by a discovery source.
///
/// `rssi == None` marks a name-only observation: it fills the name of a live
/// device without feeding the signal average.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryEvent {
    pub mac: MacAddress,
    pub name: String,
    pub rssi: Option<f64>,
    pub kind: DeviceType,
    pub frequency: u32,
    pub channel: u32,
}

impl DiscoveryEvent {
    pub fn new(mac: MacAddress, name: impl Into<String>, rssi: f64, kind: DeviceType) -> Self {
        Self {
            mac,
            name: name.into(),
            rssi: Some(rssi),
            kind,
            frequency: 0,
            channel: 0,
        }
    }

    pub fn name_only(mac: MacAddress, name: impl Into<String>, kind: DeviceType) -> Self {
        Self {
            mac,
            name: name.into(),
            rssi: None,
            kind,
            frequency: 0,
            channel: 0,
        }
    }

    pub fn with_radio(mut self, frequency: u32, channel: u32) -> Self {
        self.frequency = frequency;
        self.channel = channel;
        self
    }
}

/// Serializable view of a device handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub mac: String,
    pub name: String,
    pub kind: DeviceType,
    pub rssi: f64,
    pub distance: f64,
    pub angle_deg: f64,
    pub elevation: f64,
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub elevation_label: String,
    #[serde(default)]
    pub frequency: u32,
    #[serde(default)]
    pub channel: u32,
    #[serde(default)]
    pub band: String,
    pub age_secs: f64,
}

impl DeviceSummary {
    pub fn from_device(device: &Device, now: Instant) -> Self {
        Self {
            mac: device.mac.to_string(),
            name: device.name.clone(),
            kind: device.kind,
            rssi: device.rssi,
            distance: device.distance,
            angle_deg: device.angle.to_degrees(),
            elevation: device.elevation,
            direction: device.direction().to_string(),
            elevation_label: device.elevation_label().to_string(),
            frequency: device.frequency,
            channel: device.channel,
            band: device.band().to_string(),
            age_secs: now.saturating_duration_since(device.last_seen).as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, frequency: u32) -> Device {
        Device {
            mac: MacAddress::parse("AA:BB:CC:DD:EE:FF").unwrap(),
            name: name.into(),
            rssi: -60.0,
            kind: DeviceType::WiFi,
            last_seen: Instant::now(),
            angle: 0.0,
            distance: 1.0,
            elevation: 0.0,
            frequency,
            channel: 0,
        }
    }

    #[test]
    fn callsign_truncates_names_and_tags_unnamed_devices() {
        assert_eq!(sample("Galaxy S24 Ultra", 0).callsign(8), "Galaxy S");
        let tag = sample("", 0).callsign(8);
        assert!(tag.starts_with('#'));
        assert_eq!(tag.len(), 4);
        assert_eq!(tag, sample("", 0).callsign(8));
    }

    #[test]
    fn band_follows_frequency() {
        assert_eq!(sample("ap", 5180).band(), "5G");
        assert_eq!(sample("ap", 2437).band(), "2.4G");
        assert_eq!(sample("ap", 0).band(), "");
        assert_eq!(sample("", 0).display_name(), "[unnamed]");
    }

    #[test]
    fn bearing_maps_to_nearest_compass_point() {
        let mut device = sample("tag", 0);
        for (degrees, expected) in [
            (0.0, "N"),
            (10.0, "N"),
            (350.0, "N"),
            (50.0, "NE"),
            (92.0, "E"),
            (180.0, "S"),
            (230.0, "SW"),
            (265.0, "W"),
            (320.0, "NW"),
        ] {
            device.angle = f64::to_radians(degrees);
            assert_eq!(device.direction(), expected, "{} degrees", degrees);
        }
    }

    #[test]
    fn elevation_is_level_inside_the_dead_band() {
        let mut device = sample("tag", 0);
        for (elevation, expected) in [(0.9, "above"), (0.2, "level"), (0.0, "level"), (-0.2, "level"), (-0.5, "below")] {
            device.elevation = elevation;
            assert_eq!(device.elevation_label(), expected);
        }
    }

    #[test]
    fn summary_carries_direction_and_elevation() {
        let mut device = sample("tag", 0);
        device.angle = std::f64::consts::PI;
        device.elevation = -0.7;
        let summary = DeviceSummary::from_device(&device, device.last_seen);
        assert_eq!(summary.direction, "S");
        assert_eq!(summary.elevation_label, "below");
        assert_eq!(summary.age_secs, 0.0);
    }

    #[test]
    fn device_types_parse_case_insensitively() {
        assert_eq!("BLE".parse::<DeviceType>().unwrap(), DeviceType::Ble);
        assert_eq!(" wifi ".parse::<DeviceType>().unwrap(), DeviceType::WiFi);
        assert_eq!("Classic".parse::<DeviceType>().unwrap(), DeviceType::Classic);
        assert!("zigbee".parse::<DeviceType>().is_err());
    }
}
