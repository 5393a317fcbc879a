pub mod history;
pub mod store;
pub mod visibility;

pub use history::RssiRing;
pub use store::{DeviceRegistry, TypeCounts};
pub use visibility::{DeviceFilter, Visibility};
