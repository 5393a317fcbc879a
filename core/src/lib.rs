//! Aggregation and radar-layout engine for the proximity radar.
//!
//! Discovery sources push events through a gated queue into the device
//! registry; the orchestrator ticks the sweep, evicts stale devices and
//! publishes frames that the radar projector turns into a character grid.

pub mod clock;
pub mod device;
pub mod discovery;
pub mod math;
pub mod orchestrator;
pub mod prelude;
pub mod radar;
pub mod registry;
pub mod telemetry;

pub use device::{Device, DeviceSummary, DeviceType, DiscoveryEvent, MacAddress};
pub use orchestrator::{Frame, Orchestrator, OrchestratorHandle};
pub use prelude::{DiscoverySource, EngineConfig, EngineError, EngineResult};
pub use radar::{RadarLayout, RadarProjector, Sweep};
pub use registry::DeviceRegistry;
