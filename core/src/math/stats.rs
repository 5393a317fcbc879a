use serde::{Deserialize, Serialize};

/// Summary of a device's signal trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

pub struct StatsHelper;

impl StatsHelper {
    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    pub fn summarize(samples: &[f64]) -> Option<TraceStats> {
        if samples.is_empty() {
            return None;
        }
        let mean = Self::mean(samples);
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let variance =
            samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / samples.len() as f64;
        Some(TraceStats {
            mean,
            min,
            max,
            std_dev: variance.sqrt(),
        })
    }
}
