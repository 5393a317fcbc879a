//! Event producers and the queue that carries their events to the engine.

pub mod parsers;
pub mod probe;
pub mod resolver;
pub mod sink;
pub mod stream;

pub use probe::{program_available, run_probe, ProbeParser, ProbeSource, ProbeSpec};
pub use resolver::{NameLookup, NameResolver, ResolverConfig};
pub use sink::{Envelope, EventBus, EventSink};
pub use stream::{report_to_event, AdapterFeed, AdvertisementReport, ReportCallback, StreamSource};
