use anyhow::Context;
use clap::Parser;
use gui_bridge::bridge::{BridgeState, GuiBridge};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::ScannerConfig;
use workflow::runner::Runner;

mod adapter;
mod generator;
mod gui_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Proximity radar for BLE, classic Bluetooth and Wi-Fi emitters")]
struct Args {
    /// Run with a synthetic device fleet instead of real adapters
    #[arg(long, default_value_t = false)]
    demo: bool,
    /// Bluetooth adapter used for classic scans and name lookups [default: hci0]
    #[arg(long)]
    adapter: Option<String>,
    /// Maximum radar range in meters [default: 30]
    #[arg(long)]
    range: Option<f64>,
    /// Load scanner settings from YAML; flags given on the command line win
    #[arg(long)]
    config: Option<PathBuf>,
    /// Address of the HTTP bridge [default: 127.0.0.1:9000]
    #[arg(long)]
    bind: Option<SocketAddr>,
    /// Seed for a reproducible demo fleet
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ScannerConfig> {
        let mut config = match &self.config {
            Some(path) => ScannerConfig::load(path)?,
            None => ScannerConfig::default(),
        };
        config.demo |= self.demo;
        if let Some(adapter) = self.adapter {
            config.adapter = adapter;
        }
        if let Some(range) = self.range {
            config.engine.max_range = range;
        }
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.engine.validate().context("validating command-line settings")?;
        Ok(config)
    }
}

fn print_permission_hint(err: &proxcore::EngineError) {
    eprintln!("\nError: {}\n", err);
    eprintln!("Bluetooth scanning requires elevated permissions.");
    eprintln!("Try one of:");
    eprintln!("  sudo proximity-radar");
    eprintln!("  sudo setcap cap_net_admin+ep $(which proximity-radar)");
    eprintln!("  proximity-radar --demo    (demo mode, no hardware needed)");
}

async fn serve(runner: Runner) -> anyhow::Result<()> {
    let config = runner.config().clone();
    let mut orchestrator = runner.build().await?;
    if let Err(err) = orchestrator.start_sources() {
        if !config.demo {
            print_permission_hint(&err);
        }
        return Err(err).context("starting discovery");
    }

    let handle = orchestrator.handle();
    let bridge = GuiBridge::spawn(BridgeState::new(handle.clone(), config.engine.clone()), config.bind)?;
    let engine = tokio::spawn(orchestrator.run());
    log::info!(
        "radar running ({} mode, range {} m); Ctrl+C to stop",
        if config.demo { "demo" } else { "live" },
        config.engine.max_range
    );

    tokio::select! {
        result = signal::ctrl_c() => result.context("awaiting Ctrl+C to exit")?,
        _ = handle.stopped() => {}
    }
    handle.shutdown();
    engine.await.context("joining orchestrator")?;
    bridge.task.await.context("joining HTTP bridge")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Args::parse().into_config()?;

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating tokio runtime")?;
    runtime.block_on(serve(Runner::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from(["proximity-radar", "--demo", "--range", "12.5", "--seed", "9"]);
        let config = args.into_config().unwrap();
        assert!(config.demo);
        assert_eq!(config.engine.max_range, 12.5);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.adapter, "hci0");
    }

    #[test]
    fn invalid_range_is_rejected() {
        let args = Args::parse_from(["proximity-radar", "--range=0"]);
        assert!(args.into_config().is_err());
    }
}
