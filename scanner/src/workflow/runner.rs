use crate::adapter::{BluetoothctlFeed, HcitoolLookup};
use crate::generator::profile::{SyntheticConfig, SyntheticSource};
use crate::workflow::config::ScannerConfig;
use anyhow::Context;
use proxcore::discovery::parsers::{parse_hcitool_scan, parse_iw_scan, parse_nmcli};
use proxcore::discovery::{program_available, NameResolver, ProbeSource, ProbeSpec, ResolverConfig, StreamSource};
use proxcore::{DeviceRegistry, Orchestrator};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// First `Interface <name>` entry of `iw dev`.
pub fn parse_iw_interface(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Interface "))
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
}

async fn detect_wifi_interface() -> String {
    let output = tokio::time::timeout(
        Duration::from_secs(2),
        Command::new("iw").arg("dev").kill_on_drop(true).output(),
    )
    .await;
    let detected = match output {
        Ok(Ok(out)) => parse_iw_interface(&String::from_utf8_lossy(&out.stdout)),
        _ => None,
    };
    detected.unwrap_or_else(|| "wlan0".into())
}

/// Assembles the orchestrator and its sources from a [`ScannerConfig`].
#[derive(Clone)]
pub struct Runner {
    config: ScannerConfig,
}

impl Runner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn classic_probe(&self) -> ProbeSpec {
        ProbeSpec::new(
            "classic",
            "hcitool",
            &["-i", self.config.adapter.as_str(), "scan", "--flush"],
            parse_hcitool_scan,
        )
        .with_interval(Duration::from_secs(self.config.classic_interval_secs))
        .with_timeout(Duration::from_secs(15))
    }

    /// nmcli when present, otherwise `iw` on the configured or detected
    /// interface. `None` when neither tool is installed.
    pub async fn wifi_probe(&self) -> Option<ProbeSpec> {
        let interval = Duration::from_secs(self.config.wifi_interval_secs);
        if program_available("nmcli") {
            return Some(
                ProbeSpec::new(
                    "wifi",
                    "nmcli",
                    &["-t", "-f", "BSSID,SSID,FREQ,CHAN,SIGNAL", "dev", "wifi", "list"],
                    parse_nmcli,
                )
                .with_interval(interval)
                .with_timeout(Duration::from_secs(15)),
            );
        }
        if !program_available("iw") {
            return None;
        }
        let iface = match self.config.wifi_interface.clone() {
            Some(iface) => iface,
            None => detect_wifi_interface().await,
        };
        Some(
            ProbeSpec::new("wifi", "iw", &["dev", iface.as_str(), "scan"], parse_iw_scan)
                .with_interval(interval)
                .with_timeout(Duration::from_secs(20)),
        )
    }

    /// Builds the orchestrator with the demo fleet, or with the live BLE
    /// feed plus whatever auxiliary probes this host supports.
    pub async fn build(&self) -> anyhow::Result<Orchestrator> {
        let engine = self.config.engine.clone();
        engine.validate().context("validating engine config")?;
        let registry = Arc::new(DeviceRegistry::new(&engine));
        let orchestrator = Orchestrator::new(engine.clone(), registry);

        if self.config.demo {
            let source = SyntheticSource::new(SyntheticConfig {
                seed: self.config.seed,
                ..Default::default()
            });
            return Ok(orchestrator.with_primary(Box::new(source)));
        }

        let mut orchestrator = orchestrator.with_primary(Box::new(StreamSource::new(
            "ble",
            BluetoothctlFeed::new(),
        )));
        if program_available("hcitool") {
            orchestrator = orchestrator
                .with_auxiliary(Box::new(ProbeSource::new(self.classic_probe())))
                .with_resolver(NameResolver::new(
                    ResolverConfig::from(&engine),
                    Arc::new(HcitoolLookup::new(self.config.adapter.clone())),
                ));
        } else {
            log::warn!("hcitool not found; classic discovery and name resolution disabled");
        }
        match self.wifi_probe().await {
            Some(spec) => orchestrator = orchestrator.with_auxiliary(Box::new(ProbeSource::new(spec))),
            None => log::warn!("neither nmcli nor iw found; Wi-Fi discovery disabled"),
        }
        Ok(orchestrator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iw_interface_is_first_listed() {
        let output = "phy#0\n\tInterface wlp2s0\n\t\tifindex 3\n\tInterface wlan1\n";
        assert_eq!(parse_iw_interface(output).as_deref(), Some("wlp2s0"));
        assert_eq!(parse_iw_interface("phy#0\n"), None);
    }

    #[test]
    fn classic_probe_targets_adapter() {
        let runner = Runner::new(ScannerConfig::from_args(false, "hci1", 30.0));
        let spec = runner.classic_probe();
        assert_eq!(spec.program, "hcitool");
        assert_eq!(spec.args, vec!["-i", "hci1", "scan", "--flush"]);
        assert_eq!(spec.interval, Duration::from_secs(8));
        assert_eq!(spec.timeout, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn demo_build_runs_and_shuts_down() {
        let mut config = ScannerConfig::from_args(true, "hci0", 30.0);
        config.seed = Some(5);
        let mut orchestrator = Runner::new(config).build().await.unwrap();
        orchestrator.start_sources().unwrap();
        let handle = orchestrator.handle();
        let task = tokio::spawn(orchestrator.run());

        tokio::time::timeout(Duration::from_secs(3), async {
            while handle.registry().count() < 5 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn build_rejects_invalid_engine() {
        let mut config = ScannerConfig::from_args(true, "hci0", 30.0);
        config.engine.max_range = 0.0;
        assert!(Runner::new(config).build().await.is_err());
    }

    #[tokio::test]
    async fn configured_wifi_interface_skips_detection() {
        let mut config = ScannerConfig::from_args(false, "hci0", 30.0);
        config.wifi_interface = Some("wlp3s0".into());
        let Some(spec) = Runner::new(config).wifi_probe().await else {
            return;
        };
        if spec.program == "iw" {
            assert_eq!(spec.args, vec!["dev", "wlp3s0", "scan"]);
        } else {
            assert_eq!(spec.program, "nmcli");
        }
    }

    #[tokio::test]
    async fn interface_detection_always_yields_a_name() {
        let iface = detect_wifi_interface().await;
        assert!(!iface.is_empty());
    }
}
