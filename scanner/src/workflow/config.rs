use anyhow::Context;
use proxcore::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub engine: EngineConfig,
    /// Replace the adapters with a synthetic fleet.
    pub demo: bool,
    pub adapter: String,
    pub bind: SocketAddr,
    pub classic_interval_secs: u64,
    pub wifi_interval_secs: u64,
    /// Interface for `iw` scans; detected when absent.
    pub wifi_interface: Option<String>,
    pub seed: Option<u64>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            demo: false,
            adapter: "hci0".into(),
            bind: SocketAddr::from(([127, 0, 0, 1], 9000)),
            classic_interval_secs: 8,
            wifi_interval_secs: 10,
            wifi_interface: None,
            seed: None,
        }
    }
}

impl ScannerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading scanner config {}", path_ref.display()))?;
        let config: ScannerConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing scanner config {}", path_ref.display()))?;
        config
            .engine
            .validate()
            .with_context(|| format!("validating scanner config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(demo: bool, adapter: &str, range: f64) -> Self {
        Self {
            engine: EngineConfig {
                max_range: range,
                ..Default::default()
            },
            demo,
            adapter: adapter.to_string(),
            ..Default::default()
        }
    }
}
