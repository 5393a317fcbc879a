//! Host tooling behind the live discovery sources.

pub mod bluetoothctl;
pub mod lookup;

pub use bluetoothctl::BluetoothctlFeed;
pub use lookup::HcitoolLookup;
