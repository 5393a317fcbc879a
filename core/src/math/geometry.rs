//! Distance/angle model and the polar helpers used by the radar.
//!
//! Angles follow the compass convention: 0 is north ("up" on screen) and they
//! grow clockwise, always normalized into `[0, 2π)`.

use crate::device::MacAddress;
use sha2::{Digest, Sha256};
use std::f64::consts::{PI, TAU};

/// Lower bound of every distance estimate (meters).
pub const MIN_DISTANCE: f64 = 0.1;

pub fn mac_digest(mac: &MacAddress) -> [u8; 32] {
    Sha256::digest(mac.as_str().as_bytes()).into()
}

fn digest_word(digest: &[u8; 32], offset: usize) -> u32 {
    u32::from_be_bytes([
        digest[offset],
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ])
}

/// Stable bearing for a MAC, from bytes 0..4 of its SHA-256.
pub fn mac_to_angle(mac: &MacAddress) -> f64 {
    let word = digest_word(&mac_digest(mac), 0);
    word as f64 / (u32::MAX as f64 + 1.0) * TAU
}

/// Stable elevation in `[-1, 1]`, from bytes 4..8 so it is uncorrelated with
/// the bearing.
pub fn mac_to_elevation(mac: &MacAddress) -> f64 {
    let word = digest_word(&mac_digest(mac), 4);
    word as f64 / u32::MAX as f64 * 2.0 - 1.0
}

/// Log-distance path-loss estimate: `10^((P1m - rssi) / (10 n))`.
pub fn rssi_to_distance(rssi: f64, measured_power: f64, path_loss_exponent: f64) -> f64 {
    if rssi >= 0.0 || !rssi.is_finite() {
        return MIN_DISTANCE;
    }
    let distance = 10f64.powf((measured_power - rssi) / (10.0 * path_loss_exponent));
    distance.max(MIN_DISTANCE)
}

pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs.
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Shortest angular distance, in `[0, π]`.
pub fn angle_diff(a: f64, b: f64) -> f64 {
    let d = (normalize_angle(a) - normalize_angle(b)).abs();
    if d > PI {
        TAU - d
    } else {
        d
    }
}

/// Distance of a grid cell from the center, in column units.
pub fn cell_distance(col: i32, row: i32, center_x: i32, center_y: i32, aspect_ratio: f64) -> f64 {
    let dx = (col - center_x) as f64;
    let dy = (row - center_y) as f64 / aspect_ratio;
    dx.hypot(dy)
}

/// Compass angle from the center to a grid cell.
pub fn cell_angle(col: i32, row: i32, center_x: i32, center_y: i32, aspect_ratio: f64) -> f64 {
    let dx = (col - center_x) as f64;
    let dy = (row - center_y) as f64 / aspect_ratio;
    normalize_angle(dx.atan2(-dy))
}

/// Linear meters-to-cells scale, clipped at the rim.
pub fn meters_to_radius(meters: f64, max_range: f64, radar_radius: f64) -> f64 {
    if meters > max_range {
        radar_radius
    } else {
        meters / max_range * radar_radius
    }
}

/// Ring glyph for one of eight compass sectors.
pub fn ring_char(angle: f64) -> char {
    let sector = (normalize_angle(angle) / (PI / 4.0)).round() as usize % 8;
    match sector {
        0 | 4 => '-',
        1 | 5 => '/',
        2 | 6 => '|',
        _ => '\\',
    }
}
