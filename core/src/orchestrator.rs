use crate::device::{Device, DeviceType};
use crate::discovery::{Envelope, EventBus, NameResolver};
use crate::prelude::{DiscoverySource, EngineConfig, EngineError, EngineResult};
use crate::radar::Sweep;
use crate::registry::{DeviceRegistry, TypeCounts, Visibility};
use crate::telemetry::{LogManager, MetricsRecorder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// What the presentation layer draws on one render tick.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sweep: Sweep,
    pub devices: Vec<Device>,
    pub counts: TypeCounts,
}

/// Cloneable control surface of a running orchestrator.
#[derive(Clone)]
pub struct OrchestratorHandle {
    shutdown: CancellationToken,
    scanning: Arc<AtomicBool>,
    registry: Arc<DeviceRegistry>,
    visibility: Arc<Visibility>,
    metrics: Arc<MetricsRecorder>,
    frames: watch::Receiver<Frame>,
}

impl OrchestratorHandle {
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Resolves once shutdown has been requested.
    pub async fn stopped(&self) {
        self.shutdown.cancelled().await;
    }

    /// While paused, incoming events are consumed but not applied.
    pub fn set_scanning(&self, enabled: bool) {
        self.scanning.store(enabled, Ordering::SeqCst);
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn visibility(&self) -> &Arc<Visibility> {
        &self.visibility
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    pub fn frames(&self) -> watch::Receiver<Frame> {
        self.frames.clone()
    }

    /// The sweep, devices and counts of the most recent render tick.
    pub fn latest_frame(&self) -> Frame {
        self.frames.borrow().clone()
    }
}

/// Owns the sources and drives the render and eviction ticks.
pub struct Orchestrator {
    config: EngineConfig,
    registry: Arc<DeviceRegistry>,
    visibility: Arc<Visibility>,
    sweep: Sweep,
    bus: EventBus,
    primary: Option<Box<dyn DiscoverySource>>,
    auxiliary: Vec<Box<dyn DiscoverySource>>,
    resolver: Option<NameResolver>,
    metrics: Arc<MetricsRecorder>,
    shutdown: CancellationToken,
    scanning: Arc<AtomicBool>,
    frames: watch::Sender<Frame>,
    frames_rx: watch::Receiver<Frame>,
    logger: LogManager,
}

impl Orchestrator {
    pub fn new(config: EngineConfig, registry: Arc<DeviceRegistry>) -> Self {
        let sweep = Sweep::new(
            registry.clock().now(),
            config.rotations_per_second(),
            config.trail_width(),
        );
        let (frames, frames_rx) = watch::channel(Frame {
            sweep,
            devices: Vec::new(),
            counts: TypeCounts::default(),
        });
        Self {
            config,
            registry,
            visibility: Arc::new(Visibility::new()),
            sweep,
            bus: EventBus::new(),
            primary: None,
            auxiliary: Vec::new(),
            resolver: None,
            metrics: Arc::new(MetricsRecorder::new()),
            shutdown: CancellationToken::new(),
            scanning: Arc::new(AtomicBool::new(true)),
            frames,
            frames_rx,
            logger: LogManager::new("orchestrator"),
        }
    }

    pub fn with_primary(mut self, source: Box<dyn DiscoverySource>) -> Self {
        self.primary = Some(source);
        self
    }

    pub fn with_auxiliary(mut self, source: Box<dyn DiscoverySource>) -> Self {
        self.auxiliary.push(source);
        self
    }

    pub fn with_resolver(mut self, resolver: NameResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle {
            shutdown: self.shutdown.clone(),
            scanning: self.scanning.clone(),
            registry: self.registry.clone(),
            visibility: self.visibility.clone(),
            metrics: self.metrics.clone(),
            frames: self.frames_rx.clone(),
        }
    }

    /// Starts the primary source, then every auxiliary one.
    ///
    /// Only a primary failure is fatal; auxiliary sources that cannot start
    /// are logged and dropped.
    pub fn start_sources(&mut self) -> EngineResult<()> {
        let primary = self
            .primary
            .as_mut()
            .ok_or_else(|| EngineError::SourceUnavailable("no primary source configured".into()))?;
        if let Err(err) = primary.start(self.bus.sink()) {
            let err = match err {
                EngineError::SourceUnavailable(_) => err,
                other => EngineError::SourceUnavailable(format!("{}: {}", primary.name(), other)),
            };
            return Err(err);
        }
        self.logger.record(&format!("primary source {} started", primary.name()));

        let bus = &self.bus;
        let logger = &self.logger;
        self.auxiliary.retain_mut(|source| match source.start(bus.sink()) {
            Ok(()) => {
                logger.record(&format!("auxiliary source {} started", source.name()));
                true
            }
            Err(err) => {
                logger.warn(&format!("auxiliary source {} unavailable: {}", source.name(), err));
                false
            }
        });

        if let Some(resolver) = self.resolver.as_mut() {
            resolver.start(self.bus.sink());
        }
        Ok(())
    }

    /// Runs until the handle requests shutdown, then stops every source.
    pub async fn run(mut self) {
        let shutdown = self.shutdown.clone();
        let mut render = tokio::time::interval(self.config.render_period());
        render.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut evict = tokio::time::interval(self.config.evict_interval());
        evict.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(envelope) = self.bus.recv() => self.dispatch(envelope),
                _ = render.tick() => self.render(),
                _ = evict.tick() => self.evict(),
            }
        }

        self.stop_all();
        self.logger.record("stopped");
    }

    fn dispatch(&self, envelope: Envelope) {
        let scanning = self.scanning.load(Ordering::SeqCst);
        let registry = &self.registry;
        match envelope.deliver(|event| scanning && registry.apply(event)) {
            Some(true) => self.metrics.record_applied(),
            _ => self.metrics.record_dropped(),
        }
    }

    fn render(&mut self) {
        self.sweep.update(self.registry.clock().now());
        let devices = self.registry.snapshot();

        if let Some(resolver) = self.resolver.as_ref() {
            if self.scanning.load(Ordering::SeqCst) {
                devices
                    .iter()
                    .filter(|d| d.name.is_empty() && d.kind != DeviceType::WiFi)
                    .filter(|d| resolver.should_resolve(&d.mac))
                    .filter(|d| resolver.request_resolve(&d.mac))
                    .for_each(|_| self.metrics.record_resolution_attempt());
            }
        }

        let counts = TypeCounts::tally(&devices);
        self.frames.send_replace(Frame {
            sweep: self.sweep,
            devices,
            counts,
        });
        self.metrics.record_frame();
    }

    /// Removes stale devices along with their resolver budget and
    /// hide/isolate choices.
    fn evict(&self) {
        let removed = self.registry.evict_stale(self.config.device_timeout());
        if removed.is_empty() {
            return;
        }
        for mac in &removed {
            if let Some(resolver) = self.resolver.as_ref() {
                resolver.forget(mac);
            }
            self.visibility.forget(mac);
        }
        self.logger.record(&format!("evicted {} stale device(s)", removed.len()));
        self.metrics.record_evicted(removed.len());
    }

    fn stop_all(&mut self) {
        if let Some(primary) = self.primary.as_mut() {
            primary.stop();
        }
        for source in self.auxiliary.iter_mut() {
            source.stop();
        }
        if let Some(resolver) = self.resolver.as_mut() {
            resolver.stop();
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.stop_all();
    }
}
