pub mod labels;
pub mod projector;
pub mod sweep;

pub use labels::{place_labels, Label, LabelRequest, OccupancyMap};
pub use projector::{Cell, CellKind, Marker, RadarLayout, RadarProjector};
pub use sweep::Sweep;
