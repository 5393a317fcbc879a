use crate::device::{DeviceType, DiscoveryEvent, MacAddress};
use crate::discovery::EventSink;
use crate::prelude::{EngineConfig, EngineError, EngineResult};
use crate::telemetry::LogManager;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    pub max_attempts: u32,
    /// Wait before each lookup so the adapter is not hammered mid-scan.
    pub pause: Duration,
    pub lookup_timeout: Duration,
}

impl From<&EngineConfig> for ResolverConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.resolver_max_attempts,
            pause: Duration::from_millis(config.resolver_pause_ms),
            lookup_timeout: Duration::from_millis(config.resolver_timeout_ms),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// Asks a device for its human-readable name.
#[async_trait]
pub trait NameLookup: Send + Sync {
    /// `Ok(None)` means the device answered without a usable name.
    async fn lookup(&self, mac: &MacAddress) -> EngineResult<Option<String>>;
}

#[derive(Default)]
struct ResolverState {
    tried: HashMap<MacAddress, u32>,
    resolved: HashSet<MacAddress>,
}

/// Background name resolution for devices seen without a name.
///
/// Each MAC gets at most `max_attempts` lookups over the resolver's lifetime.
/// A successful lookup is emitted as a name-only event on the resolver's sink.
pub struct NameResolver {
    config: ResolverConfig,
    lookup: Arc<dyn NameLookup>,
    state: Arc<Mutex<ResolverState>>,
    sink: Option<EventSink>,
    cancel: CancellationToken,
    logger: LogManager,
}

impl NameResolver {
    pub fn new(config: ResolverConfig, lookup: Arc<dyn NameLookup>) -> Self {
        Self {
            config,
            lookup,
            state: Arc::new(Mutex::new(ResolverState::default())),
            sink: None,
            cancel: CancellationToken::new(),
            logger: LogManager::new("resolver"),
        }
    }

    pub fn start(&mut self, sink: EventSink) {
        self.sink = Some(sink);
    }

    pub fn should_resolve(&self, mac: &MacAddress) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        !state.resolved.contains(mac)
            && state.tried.get(mac).copied().unwrap_or(0) < self.config.max_attempts
    }

    /// Drops the attempt budget and resolved mark of an evicted device.
    pub fn forget(&self, mac: &MacAddress) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tried.remove(mac);
        state.resolved.remove(mac);
    }

    #[cfg(test)]
    fn is_resolved(&self, mac: &MacAddress) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.resolved.contains(mac)
    }

    #[cfg(test)]
    fn attempts_launched(&self, mac: &MacAddress) -> u32 {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tried.get(mac).copied().unwrap_or(0)
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tried.len() + state.resolved.len()
    }

    /// Launches one background attempt for `mac` if its budget allows.
    /// Returns whether an attempt was launched. Does nothing before `start`,
    /// after `stop` or outside a tokio runtime.
    pub fn request_resolve(&self, mac: &MacAddress) -> bool {
        let Some(sink) = self.sink.clone() else {
            return false;
        };
        if self.cancel.is_cancelled() {
            return false;
        }
        let Ok(handle) = Handle::try_current() else {
            return false;
        };

        let attempt = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.resolved.contains(mac) {
                return false;
            }
            let tried = state.tried.entry(mac.clone()).or_insert(0);
            if *tried >= self.config.max_attempts {
                return false;
            }
            *tried += 1;
            *tried
        };
        self.logger
            .debug(&format!("{} attempt {}/{}", mac, attempt, self.config.max_attempts));

        handle.spawn(resolve_once(
            mac.clone(),
            self.config,
            self.lookup.clone(),
            self.state.clone(),
            sink,
            self.cancel.clone(),
        ));
        true
    }

    /// Cancels pending attempts and closes the sink. Idempotent.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(sink) = self.sink.take() {
            sink.close();
        }
    }
}

impl Drop for NameResolver {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn resolve_once(
    mac: MacAddress,
    config: ResolverConfig,
    lookup: Arc<dyn NameLookup>,
    state: Arc<Mutex<ResolverState>>,
    sink: EventSink,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(config.pause) => {}
    }

    let result = tokio::select! {
        _ = cancel.cancelled() => return,
        result = tokio::time::timeout(config.lookup_timeout, lookup.lookup(&mac)) => result,
    };
    let name = match result {
        Ok(Ok(Some(name))) if !name.trim().is_empty() => name.trim().to_string(),
        Ok(Ok(_)) => return,
        Ok(Err(err)) => {
            log::debug!("resolver: {}", err);
            return;
        }
        Err(_) => {
            log::debug!(
                "resolver: {}",
                EngineError::ResolutionFailure(format!("{} timed out", mac))
            );
            return;
        }
    };

    state
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .resolved
        .insert(mac.clone());
    sink.send(DiscoveryEvent::name_only(mac, name, DeviceType::Ble));
}
