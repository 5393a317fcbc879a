pub mod mac;
pub mod record;
pub mod vendor;

pub use mac::MacAddress;
pub use record::{Device, DeviceSummary, DeviceType, DiscoveryEvent};
pub use vendor::lookup_manufacturer;
