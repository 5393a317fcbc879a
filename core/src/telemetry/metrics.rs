use serde::Serialize;
use std::sync::Mutex;

/// Engine-wide counters exposed on the status endpoint.
pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Metrics {
    pub events_applied: u64,
    pub events_dropped: u64,
    pub devices_evicted: u64,
    pub resolution_attempts: u64,
    pub frames_rendered: u64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    pub fn record_applied(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.events_applied += 1;
        }
    }

    /// Counts an event the registry or a closed sink refused.
    pub fn record_dropped(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.events_dropped += 1;
        }
    }

    pub fn record_evicted(&self, count: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.devices_evicted += count as u64;
        }
    }

    pub fn record_resolution_attempt(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.resolution_attempts += 1;
        }
    }

    pub fn record_frame(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.frames_rendered += 1;
        }
    }

    pub fn snapshot(&self) -> Metrics {
        self.inner.lock().map(|m| *m).unwrap_or_default()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
