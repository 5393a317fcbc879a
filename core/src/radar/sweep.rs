use crate::math::geometry::normalize_angle;
use std::f64::consts::TAU;
use std::time::Instant;

/// Rotating scan line.
///
/// The angle is always derived from wall-clock time since `started`, never
/// accumulated, so irregular or paused ticks cannot make it drift or jump.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sweep {
    pub angle: f64,
    started: Instant,
    rotations_per_second: f64,
    trail_width: f64,
}

impl Sweep {
    pub fn new(started: Instant, rotations_per_second: f64, trail_width: f64) -> Self {
        Self {
            angle: 0.0,
            started,
            rotations_per_second,
            trail_width,
        }
    }

    pub fn update(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        self.angle = normalize_angle(elapsed * self.rotations_per_second * TAU);
    }

    pub fn degrees(&self) -> f64 {
        self.angle.to_degrees()
    }

    pub fn trail_width(&self) -> f64 {
        self.trail_width
    }

    /// Glow in `[0, 1]`: 1 under the sweep head, fading linearly to 0 at the
    /// end of the trail, 0 everywhere else.
    pub fn intensity(&self, cell_angle: f64) -> f64 {
        let lag = normalize_angle(self.angle - cell_angle);
        if lag > self.trail_width {
            0.0
        } else {
            1.0 - lag / self.trail_width
        }
    }
}
