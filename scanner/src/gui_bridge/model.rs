use proxcore::math::TraceStats;
use proxcore::radar::{Marker, RadarLayout};
use proxcore::registry::TypeCounts;
use proxcore::telemetry::Metrics;
use proxcore::{DeviceSummary, DeviceType};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Device-list ordering requested by `?sort=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Rssi,
    Name,
    Distance,
    Type,
}

fn kind_rank(kind: DeviceType) -> u8 {
    match kind {
        DeviceType::Ble => 0,
        DeviceType::Classic => 1,
        DeviceType::WiFi => 2,
    }
}

/// Sorts with the MAC as the final tie-break so the order is stable
/// between polls. Unnamed devices sort after named ones by name.
pub fn sort_devices(devices: &mut [DeviceSummary], key: SortKey) {
    devices.sort_by(|a, b| {
        let primary = match key {
            SortKey::Rssi => b.rssi.total_cmp(&a.rssi),
            SortKey::Distance => a.distance.total_cmp(&b.distance),
            SortKey::Name => match (a.name.is_empty(), b.name.is_empty()) {
                (false, true) => Ordering::Less,
                (true, false) => Ordering::Greater,
                _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            },
            SortKey::Type => kind_rank(a.kind)
                .cmp(&kind_rank(b.kind))
                .then(b.rssi.total_cmp(&a.rssi)),
        };
        primary.then_with(|| a.mac.cmp(&b.mac))
    });
}

/// `?sort=&types=ble,wifi&q=` on `/devices`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceQuery {
    #[serde(default)]
    pub sort: SortKey,
    pub types: Option<String>,
    pub q: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RadarQuery {
    pub width: Option<usize>,
    pub height: Option<usize>,
    pub types: Option<String>,
    pub q: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerView {
    pub mac: String,
    pub kind: DeviceType,
    pub named: bool,
    pub col: i32,
    pub row: i32,
    pub label: Option<LabelView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelView {
    pub text: String,
    pub col: i32,
    pub row: i32,
}

impl From<&Marker> for MarkerView {
    fn from(marker: &Marker) -> Self {
        Self {
            mac: marker.mac.to_string(),
            kind: marker.kind,
            named: marker.named,
            col: marker.col,
            row: marker.row,
            label: marker.label.as_ref().map(|label| LabelView {
                text: label.text.clone(),
                col: label.col,
                row: label.row,
            }),
        }
    }
}

/// One rendered radar frame as served on `/radar`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RadarView {
    pub width: usize,
    pub height: usize,
    pub radius: f64,
    pub sweep_deg: f64,
    pub lines: Vec<String>,
    /// Per-cell sweep glow as digits `0`..`9`.
    pub glow: Vec<String>,
    pub markers: Vec<MarkerView>,
}

impl RadarView {
    pub fn from_layout(layout: &RadarLayout, sweep_deg: f64) -> Self {
        Self {
            width: layout.width,
            height: layout.height,
            radius: layout.radius,
            sweep_deg,
            lines: layout.to_lines(),
            glow: layout.glow_lines(),
            markers: layout.markers.iter().map(MarkerView::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryView {
    pub mac: String,
    pub samples: Vec<f64>,
    pub stats: Option<TraceStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub scanning: bool,
    pub device_count: usize,
    pub counts: TypeCounts,
    pub metrics: Metrics,
    pub sweep_deg: f64,
    pub hidden: Vec<String>,
    pub isolated: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScanToggle {
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HideToggle {
    pub hidden: bool,
}

/// `{"mac": null}` clears isolation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolateRequest {
    pub mac: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(mac: &str, name: &str, rssi: f64, kind: DeviceType) -> DeviceSummary {
        DeviceSummary {
            mac: mac.into(),
            name: name.into(),
            kind,
            rssi,
            distance: 10f64.powf((-59.0 - rssi) / 25.0),
            angle_deg: 0.0,
            elevation: 0.0,
            direction: "N".into(),
            elevation_label: "level".into(),
            frequency: 0,
            channel: 0,
            band: String::new(),
            age_secs: 0.0,
        }
    }

    fn macs(devices: &[DeviceSummary]) -> Vec<&str> {
        devices.iter().map(|d| d.mac.as_str()).collect()
    }

    #[test]
    fn sort_keys_order_devices() {
        let mut devices = vec![
            summary("AA:00:00:00:00:01", "zebra", -70.0, DeviceType::WiFi),
            summary("AA:00:00:00:00:02", "", -50.0, DeviceType::Ble),
            summary("AA:00:00:00:00:03", "Apple", -60.0, DeviceType::Classic),
            summary("AA:00:00:00:00:04", "apple", -60.0, DeviceType::Ble),
        ];

        sort_devices(&mut devices, SortKey::Rssi);
        assert_eq!(macs(&devices)[0], "AA:00:00:00:00:02");
        assert_eq!(macs(&devices)[1..3], ["AA:00:00:00:00:03", "AA:00:00:00:00:04"]);

        sort_devices(&mut devices, SortKey::Name);
        assert_eq!(
            macs(&devices),
            vec!["AA:00:00:00:00:03", "AA:00:00:00:00:04", "AA:00:00:00:00:01", "AA:00:00:00:00:02"]
        );

        sort_devices(&mut devices, SortKey::Distance);
        assert_eq!(macs(&devices)[0], "AA:00:00:00:00:02");

        sort_devices(&mut devices, SortKey::Type);
        assert_eq!(
            macs(&devices),
            vec!["AA:00:00:00:00:02", "AA:00:00:00:00:04", "AA:00:00:00:00:03", "AA:00:00:00:00:01"]
        );
    }

    #[test]
    fn sort_key_parses_lowercase() {
        let query: DeviceQuery = serde_json::from_str(r#"{"sort":"distance"}"#).unwrap();
        assert_eq!(query.sort, SortKey::Distance);
        let query: DeviceQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.sort, SortKey::Rssi);
    }
}
