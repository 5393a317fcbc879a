use proxcore::DeviceType;

/// Name and radio family of a demo emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceTemplate {
    pub name: &'static str,
    pub kind: DeviceType,
}

const fn template(name: &'static str, kind: DeviceType) -> DeviceTemplate {
    DeviceTemplate { name, kind }
}

pub const DEVICE_TEMPLATES: [DeviceTemplate; 20] = [
    template("iPhone 15 Pro", DeviceType::Ble),
    template("Galaxy S24 Ultra", DeviceType::Ble),
    template("Pixel 9 Pro", DeviceType::Ble),
    template("AirPods Pro", DeviceType::Ble),
    template("Galaxy Buds Pro", DeviceType::Classic),
    template("MacBook Air", DeviceType::Ble),
    template("Apple Watch", DeviceType::Ble),
    template("Fitbit Charge 6", DeviceType::Ble),
    template("Sony WH-1000XM5", DeviceType::Classic),
    template("JBL Flip 6", DeviceType::Classic),
    template("Tile Tracker", DeviceType::Ble),
    template("Tesla Model 3", DeviceType::Ble),
    template("Nintendo Switch", DeviceType::Classic),
    template("iPad Pro", DeviceType::Ble),
    template("OnePlus Buds 3", DeviceType::Ble),
    template("HomeNetwork_2G", DeviceType::WiFi),
    template("XFINITY-7A3F", DeviceType::WiFi),
    template("TP-Link_5GHz", DeviceType::WiFi),
    template("AndroidAP", DeviceType::WiFi),
    template("Starlink_WiFi", DeviceType::WiFi),
];

/// Minimum number of picks per radio family in a demo fleet.
pub fn minimum_picks(kind: DeviceType) -> usize {
    match kind {
        DeviceType::Ble => 5,
        DeviceType::Classic => 2,
        DeviceType::WiFi => 3,
    }
}

pub const WIFI_5G_CHANNELS: [u32; 8] = [36, 40, 44, 48, 149, 153, 157, 161];
