use crate::device::{Device, DeviceType, MacAddress};
use crate::math::geometry::{cell_angle, cell_distance, meters_to_radius, ring_char};
use crate::prelude::EngineConfig;
use crate::radar::labels::{place_labels, Label, LabelRequest};
use crate::radar::sweep::Sweep;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// What a grid cell shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    Blank,
    Interior,
    Ring,
    Axis,
    Center,
    Marker(DeviceType),
    Label { named: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub glyph: char,
    pub kind: CellKind,
    /// Sweep glow in `[0, 1]`.
    pub intensity: f64,
}

impl Cell {
    pub const BLANK: Cell = Cell {
        glyph: ' ',
        kind: CellKind::Blank,
        intensity: 0.0,
    };
}

/// A device's place on the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub mac: MacAddress,
    pub kind: DeviceType,
    pub named: bool,
    pub col: i32,
    pub row: i32,
    pub label: Option<Label>,
}

/// Complete screen layout for one frame.
#[derive(Debug, Clone)]
pub struct RadarLayout {
    pub width: usize,
    pub height: usize,
    pub center_x: i32,
    pub center_y: i32,
    pub radius: f64,
    pub markers: Vec<Marker>,
    /// Indexed `[row, col]`.
    pub grid: Array2<Cell>,
}

impl RadarLayout {
    fn empty(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            center_x: 0,
            center_y: 0,
            radius: 0.0,
            markers: Vec::new(),
            grid: Array2::from_elem((0, 0), Cell::BLANK),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    pub fn cell(&self, col: i32, row: i32) -> Option<&Cell> {
        if col < 0 || row < 0 {
            return None;
        }
        self.grid.get((row as usize, col as usize))
    }

    /// Plain-text rendering, one string per row.
    pub fn to_lines(&self) -> Vec<String> {
        self.grid
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|cell| cell.glyph).collect())
            .collect()
    }

    /// Sweep glow per cell quantized to a digit `0`..`9`, one string per row.
    pub fn glow_lines(&self) -> Vec<String> {
        self.grid
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .map(|cell| {
                        let level = (cell.intensity.clamp(0.0, 1.0) * 9.0).round() as u32;
                        char::from_digit(level, 10).unwrap_or('0')
                    })
                    .collect()
            })
            .collect()
    }
}

/// Maps registry snapshots onto a character grid.
#[derive(Debug, Clone, PartialEq)]
pub struct RadarProjector {
    pub width: usize,
    pub height: usize,
    pub max_range: f64,
    pub aspect_ratio: f64,
    pub ring_count: usize,
    pub max_label_len: usize,
}

impl RadarProjector {
    pub const MIN_WIDTH: usize = 10;
    pub const MIN_HEIGHT: usize = 5;

    pub fn new(width: usize, height: usize, config: &EngineConfig) -> Self {
        Self {
            width,
            height,
            max_range: config.max_range,
            aspect_ratio: config.aspect_ratio,
            ring_count: config.ring_count,
            max_label_len: config.max_label_len,
        }
    }

    fn center(&self) -> (i32, i32) {
        (self.width as i32 / 2, self.height as i32 / 2)
    }

    fn radius(&self) -> f64 {
        let (cx, cy) = self.center();
        let horizontal = (cx - 1) as f64;
        let vertical = ((cy - 1) as f64 / self.aspect_ratio).trunc();
        horizontal.min(vertical).max(3.0)
    }

    /// Grid cell for a device's stored polar coordinates.
    pub fn device_cell(&self, device: &Device) -> (i32, i32) {
        let (cx, cy) = self.center();
        let r = meters_to_radius(device.distance, self.max_range, self.radius());
        let col = cx + (r * device.angle.sin()).round() as i32;
        let row = cy - (r * device.angle.cos() * self.aspect_ratio).round() as i32;
        (col, row)
    }

    /// Marker positions and labels, devices taking priority in input order.
    pub fn place_devices(&self, devices: &[Device]) -> Vec<Marker> {
        let requests: Vec<LabelRequest> = devices
            .iter()
            .map(|device| {
                let (col, row) = self.device_cell(device);
                LabelRequest {
                    col,
                    row,
                    text: device.callsign(self.max_label_len),
                }
            })
            .collect();
        let labels = place_labels(&requests, self.width, self.height);

        devices
            .iter()
            .zip(requests)
            .zip(labels)
            .map(|((device, request), label)| Marker {
                mac: device.mac.clone(),
                kind: device.kind,
                named: !device.name.is_empty(),
                col: request.col,
                row: request.row,
                label,
            })
            .collect()
    }

    pub fn project(&self, devices: &[Device], sweep: &Sweep) -> RadarLayout {
        if self.width < Self::MIN_WIDTH || self.height < Self::MIN_HEIGHT {
            return RadarLayout::empty(self.width, self.height);
        }

        let (cx, cy) = self.center();
        let radius = self.radius();
        let markers = self.place_devices(devices);

        let mut grid = Array2::from_shape_fn((self.height, self.width), |(row, col)| {
            self.background_cell(col as i32, row as i32, radius, sweep)
        });

        for marker in &markers {
            let Some(label) = &marker.label else { continue };
            for (offset, glyph) in label.text.chars().enumerate() {
                let col = label.col + offset as i32;
                if let Some(cell) = cell_mut(&mut grid, col, label.row) {
                    *cell = Cell {
                        glyph,
                        kind: CellKind::Label {
                            named: marker.named,
                        },
                        intensity: sweep.intensity(cell_angle(col, label.row, cx, cy, self.aspect_ratio)),
                    };
                }
            }
        }

        for marker in &markers {
            if let Some(cell) = cell_mut(&mut grid, marker.col, marker.row) {
                *cell = Cell {
                    glyph: marker.kind.symbol(),
                    kind: CellKind::Marker(marker.kind),
                    intensity: sweep.intensity(cell_angle(
                        marker.col,
                        marker.row,
                        cx,
                        cy,
                        self.aspect_ratio,
                    )),
                };
            }
        }

        RadarLayout {
            width: self.width,
            height: self.height,
            center_x: cx,
            center_y: cy,
            radius,
            markers,
            grid,
        }
    }

    fn background_cell(&self, col: i32, row: i32, radius: f64, sweep: &Sweep) -> Cell {
        let (cx, cy) = self.center();
        let dist = cell_distance(col, row, cx, cy, self.aspect_ratio);
        if dist > radius + 0.5 {
            return Cell::BLANK;
        }
        let angle = cell_angle(col, row, cx, cy, self.aspect_ratio);
        let intensity = sweep.intensity(angle);

        let (glyph, kind) = if col == cx && row == cy {
            ('+', CellKind::Center)
        } else if col == cx && dist <= radius {
            ('|', CellKind::Axis)
        } else if row == cy && dist <= radius {
            ('-', CellKind::Axis)
        } else if self.on_ring(dist, radius) {
            (ring_char(angle), CellKind::Ring)
        } else if dist <= radius {
            ('.', CellKind::Interior)
        } else {
            return Cell::BLANK;
        };

        Cell {
            glyph,
            kind,
            intensity,
        }
    }

    fn on_ring(&self, dist: f64, radius: f64) -> bool {
        let rings = self.ring_count.max(1);
        (1..=rings).any(|ring| {
            let ring_radius = radius * ring as f64 / rings as f64;
            (dist - ring_radius).abs() < 0.8
        })
    }
}

fn cell_mut(grid: &mut Array2<Cell>, col: i32, row: i32) -> Option<&mut Cell> {
    if col < 0 || row < 0 {
        return None;
    }
    grid.get_mut((row as usize, col as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::geometry::mac_to_angle;
    use std::f64::consts::PI;
    use std::time::Instant;

    fn device(mac: &str, name: &str, angle: f64, distance: f64) -> Device {
        let mac = MacAddress::parse(mac).unwrap();
        Device {
            mac,
            name: name.into(),
            rssi: -60.0,
            kind: DeviceType::Ble,
            last_seen: Instant::now(),
            angle,
            distance,
            elevation: 0.0,
            frequency: 0,
            channel: 0,
        }
    }

    fn projector(width: usize, height: usize) -> RadarProjector {
        RadarProjector::new(width, height, &EngineConfig::default())
    }

    fn sweep() -> Sweep {
        Sweep::new(Instant::now(), 0.5, PI / 3.0)
    }

    #[test]
    fn too_small_grid_yields_empty_layout() {
        let layout = projector(9, 20).project(&[], &sweep());
        assert!(layout.is_empty());
        assert!(layout.to_lines().is_empty());
    }

    #[test]
    fn devices_scale_with_range_and_clip_at_rim() {
        let p = projector(61, 31);
        // cx = 30, cy = 15, radius = min(29, 28) = 28
        let north_half = device("00:00:00:00:00:01", "", 0.0, 15.0);
        assert_eq!(p.device_cell(&north_half), (30, 15 - 7));
        let east_far = device("00:00:00:00:00:02", "", PI / 2.0, 300.0);
        assert_eq!(p.device_cell(&east_far), (30 + 28, 15));
    }

    #[test]
    fn layout_draws_center_rings_and_markers() {
        let p = projector(61, 31);
        let devices = vec![device("00:00:00:00:00:01", "Phone", PI / 2.0, 15.0)];
        let layout = p.project(&devices, &sweep());
        assert_eq!(layout.grid.dim(), (31, 61));
        assert_eq!(layout.cell(30, 15).unwrap().kind, CellKind::Center);
        assert_eq!(layout.cell(0, 0).unwrap().kind, CellKind::Blank);

        let marker = &layout.markers[0];
        assert_eq!((marker.col, marker.row), (44, 15));
        assert_eq!(layout.cell(44, 15).unwrap().glyph, '*');
        let label = marker.label.as_ref().unwrap();
        assert_eq!((label.col, label.row), (46, 15));
        assert_eq!(&layout.to_lines()[15][46..51], "Phone");
    }

    #[test]
    fn colliding_labels_never_share_a_cell() {
        let p = projector(61, 31);
        let devices = vec![
            device("00:00:00:00:00:01", "Alpha", PI / 2.0, 10.0),
            device("00:00:00:00:00:02", "Bravo", PI / 2.0, 10.6),
            device("00:00:00:00:00:03", "Charlie", PI / 2.0, 11.2),
            device("00:00:00:00:00:04", "Delta", PI / 2.0, 11.8),
        ];
        let layout = p.project(&devices, &sweep());
        let placed: Vec<&Label> = layout.markers.iter().filter_map(|m| m.label.as_ref()).collect();
        assert!(placed.len() < devices.len());
        for (i, a) in placed.iter().enumerate() {
            for b in placed.iter().skip(i + 1) {
                assert!((a.col..a.col + a.len()).all(|col| !b.covers(col, a.row)));
            }
        }
        assert!(layout.markers.iter().all(|m| layout.cell(m.col, m.row).unwrap().glyph == '*'));
    }

    #[test]
    fn sweep_glow_reaches_the_grid() {
        let p = projector(61, 31);
        let layout = p.project(&[], &sweep());
        // Sweep head at north: the cell straight above center glows fully.
        assert_eq!(layout.cell(30, 10).unwrap().intensity, 1.0);
        assert_eq!(layout.glow_lines()[10].chars().nth(30), Some('9'));
        // Directly south is far outside the trail.
        assert_eq!(layout.cell(30, 20).unwrap().intensity, 0.0);
    }

    #[test]
    fn unnamed_devices_get_hash_callsigns() {
        let p = projector(61, 31);
        let d = device("AA:BB:CC:DD:EE:FF", "", mac_to_angle(&MacAddress::parse("AA:BB:CC:DD:EE:FF").unwrap()), 5.0);
        let markers = p.place_devices(std::slice::from_ref(&d));
        let label = markers[0].label.as_ref().unwrap();
        assert_eq!(label.text, d.callsign(8));
        assert!(!markers[0].named);
    }
}
