use crate::discovery::EventSink;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables consumed by the engine. Defaults match the stock radar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// EMA weight of a new RSSI sample.
    pub smoothing_alpha: f64,
    pub device_timeout_ms: u64,
    pub evict_interval_ms: u64,
    /// Expected RSSI one meter from the emitter (dBm).
    pub measured_power: f64,
    pub path_loss_exponent: f64,
    /// Radar range in meters; devices further out sit on the rim.
    pub max_range: f64,
    pub sweep_rpm: f64,
    pub sweep_trail_deg: f64,
    pub render_hz: u32,
    pub resolver_max_attempts: u32,
    pub resolver_pause_ms: u64,
    pub resolver_timeout_ms: u64,
    pub history_capacity: usize,
    /// Width/height ratio of a terminal character cell.
    pub aspect_ratio: f64,
    pub ring_count: usize,
    pub max_label_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: 0.3,
            device_timeout_ms: 30_000,
            evict_interval_ms: 5_000,
            measured_power: -59.0,
            path_loss_exponent: 2.5,
            max_range: 30.0,
            sweep_rpm: 30.0,
            sweep_trail_deg: 60.0,
            render_hz: 30,
            resolver_max_attempts: 2,
            resolver_pause_ms: 3_000,
            resolver_timeout_ms: 4_000,
            history_capacity: 60,
            aspect_ratio: 0.5,
            ring_count: 4,
            max_label_len: 8,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(EngineError::Config(format!(
                "smoothing_alpha must be in (0, 1], got {}",
                self.smoothing_alpha
            )));
        }
        if self.path_loss_exponent <= 0.0 {
            return Err(EngineError::Config("path_loss_exponent must be positive".into()));
        }
        if self.max_range <= 0.0 {
            return Err(EngineError::Config("max_range must be positive".into()));
        }
        if self.render_hz == 0 || self.evict_interval_ms == 0 {
            return Err(EngineError::Config("tick rates must be non-zero".into()));
        }
        if self.aspect_ratio <= 0.0 || self.sweep_trail_deg <= 0.0 {
            return Err(EngineError::Config(
                "aspect_ratio and sweep_trail_deg must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_millis(self.device_timeout_ms)
    }

    pub fn evict_interval(&self) -> Duration {
        Duration::from_millis(self.evict_interval_ms)
    }

    pub fn render_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.render_hz.max(1) as f64)
    }

    pub fn rotations_per_second(&self) -> f64 {
        self.sweep_rpm / 60.0
    }

    pub fn trail_width(&self) -> f64 {
        self.sweep_trail_deg.to_radians()
    }
}

/// Failure taxonomy shared by every engine component.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("scan failure: {0}")]
    ScanFailure(String),
    #[error("name resolution failed: {0}")]
    ResolutionFailure(String),
    #[error("malformed record: {0}")]
    MalformedRecord(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// An independently scheduled producer of discovery events.
///
/// `start` spawns the source's own task(s) on the ambient tokio runtime.
/// `stop` is idempotent; once it returns, nothing this source sent can
/// reach the registry.
pub trait DiscoverySource: Send {
    fn name(&self) -> &str;
    fn start(&mut self, sink: EventSink) -> EngineResult<()>;
    fn stop(&mut self);
}
