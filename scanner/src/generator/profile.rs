use crate::generator::template::{minimum_picks, DeviceTemplate, DEVICE_TEMPLATES, WIFI_5G_CHANNELS};
use proxcore::discovery::EventSink;
use proxcore::{DeviceType, DiscoveryEvent, DiscoverySource, EngineError, EngineResult, MacAddress};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::f64::consts::TAU;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Configuration for the demo emitter fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Fixed seed for a reproducible fleet; random when absent.
    pub seed: Option<u64>,
    pub tick_ms: u64,
    pub toggle_probability: f64,
    pub blank_name_probability: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: None,
            tick_ms: 200,
            toggle_probability: 0.005,
            blank_name_probability: 0.05,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticDevice {
    pub mac: MacAddress,
    pub name: &'static str,
    pub kind: DeviceType,
    pub base_rssi: f64,
    pub amplitude: f64,
    pub phase: f64,
    pub active: bool,
    pub frequency: u32,
    pub channel: u32,
}

fn random_mac(rng: &mut StdRng) -> Option<MacAddress> {
    let bytes: [u8; 6] = rng.gen();
    let text = bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":");
    MacAddress::parse(&text).ok()
}

/// Picks the guaranteed per-family minimum, then tops up to 12–15 devices.
fn pick_templates(rng: &mut StdRng) -> Vec<DeviceTemplate> {
    let mut picked: Vec<usize> = Vec::new();
    for kind in [DeviceType::Ble, DeviceType::Classic, DeviceType::WiFi] {
        let mut family: Vec<usize> = DEVICE_TEMPLATES
            .iter()
            .enumerate()
            .filter(|(_, t)| t.kind == kind)
            .map(|(i, _)| i)
            .collect();
        family.shuffle(rng);
        picked.extend(family.into_iter().take(minimum_picks(kind)));
    }

    let total: usize = rng.gen_range(12..=15);
    let mut rest: Vec<usize> = (0..DEVICE_TEMPLATES.len()).collect();
    rest.shuffle(rng);
    let used: HashSet<usize> = picked.iter().copied().collect();
    let extra = total.saturating_sub(picked.len());
    picked.extend(rest.into_iter().filter(|i| !used.contains(i)).take(extra));

    picked.into_iter().map(|i| DEVICE_TEMPLATES[i]).collect()
}

fn wifi_radio(rng: &mut StdRng) -> (u32, u32) {
    if rng.gen_bool(0.5) {
        let frequency = 2412 + rng.gen_range(0..11u32) * 5;
        (frequency, (frequency - 2407) / 5)
    } else {
        let channel = WIFI_5G_CHANNELS[rng.gen_range(0..WIFI_5G_CHANNELS.len())];
        (5000 + channel * 5, channel)
    }
}

/// A seeded population of demo emitters with sinusoidal signal drift.
pub struct SyntheticFleet {
    devices: Vec<SyntheticDevice>,
    rng: StdRng,
    config: SyntheticConfig,
}

impl SyntheticFleet {
    pub fn new(config: SyntheticConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let devices = pick_templates(&mut rng)
            .into_iter()
            .filter_map(|template| {
                let mac = random_mac(&mut rng)?;
                let (frequency, channel) = if template.kind == DeviceType::WiFi {
                    wifi_radio(&mut rng)
                } else {
                    (0, 0)
                };
                Some(SyntheticDevice {
                    mac,
                    name: template.name,
                    kind: template.kind,
                    base_rssi: -40.0 - rng.gen::<f64>() * 50.0,
                    amplitude: 3.0 + rng.gen::<f64>() * 8.0,
                    phase: rng.gen::<f64>() * TAU,
                    active: true,
                    frequency,
                    channel,
                })
            })
            .collect();
        Self {
            devices,
            rng,
            config,
        }
    }

    pub fn devices(&self) -> &[SyntheticDevice] {
        &self.devices
    }

    /// Events for time `t` (seconds). Devices may blink out or drop their
    /// name for a tick.
    pub fn tick(&mut self, t: f64) -> Vec<DiscoveryEvent> {
        let SyntheticFleet {
            devices,
            rng,
            config,
        } = self;
        devices
            .iter_mut()
            .filter_map(|device| {
                if rng.gen::<f64>() < config.toggle_probability {
                    device.active = !device.active;
                }
                if !device.active {
                    return None;
                }
                let noise = (rng.gen::<f64>() - 0.5) * 4.0;
                let rssi = device.base_rssi + device.amplitude * (t * 0.5 + device.phase).sin() + noise;
                let name = if rng.gen::<f64>() < config.blank_name_probability {
                    ""
                } else {
                    device.name
                };
                Some(
                    DiscoveryEvent::new(device.mac.clone(), name, rssi.trunc(), device.kind)
                        .with_radio(device.frequency, device.channel),
                )
            })
            .collect()
    }
}

/// Demo source that replays a [`SyntheticFleet`] every tick.
pub struct SyntheticSource {
    fleet: Option<SyntheticFleet>,
    tick: Duration,
    sink: Option<EventSink>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let tick = Duration::from_millis(config.tick_ms.max(1));
        Self {
            fleet: Some(SyntheticFleet::new(config)),
            tick,
            sink: None,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn fleet_size(&self) -> usize {
        self.fleet.as_ref().map(|f| f.devices().len()).unwrap_or(0)
    }
}

async fn synthetic_loop(mut fleet: SyntheticFleet, tick: Duration, sink: EventSink, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(tick);
    let step = tick.as_secs_f64();
    let mut t = 0.0;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                t += step;
                for event in fleet.tick(t) {
                    if !sink.send(event) {
                        return;
                    }
                }
            }
        }
    }
}

impl DiscoverySource for SyntheticSource {
    fn name(&self) -> &str {
        "demo"
    }

    fn start(&mut self, sink: EventSink) -> EngineResult<()> {
        let handle = Handle::try_current()
            .map_err(|_| EngineError::SourceUnavailable("no async runtime available".into()))?;
        let fleet = self
            .fleet
            .take()
            .ok_or_else(|| EngineError::SourceUnavailable("demo source already started".into()))?;
        log::info!("demo source emitting {} synthetic devices", fleet.devices().len());
        self.task = Some(handle.spawn(synthetic_loop(fleet, self.tick, sink.clone(), self.cancel.clone())));
        self.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(sink) = self.sink.take() {
            sink.close();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
