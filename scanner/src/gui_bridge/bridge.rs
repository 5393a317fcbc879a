use crate::gui_bridge::model::{
    sort_devices, DeviceQuery, HideToggle, HistoryView, IsolateRequest, RadarQuery, RadarView,
    ScanToggle, StatusView,
};
use anyhow::Context;
use proxcore::math::StatsHelper;
use proxcore::registry::DeviceFilter;
use proxcore::{DeviceSummary, EngineConfig, MacAddress, OrchestratorHandle, RadarProjector};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

const DEFAULT_WIDTH: usize = 61;
const DEFAULT_HEIGHT: usize = 31;
const MAX_GRID: usize = 400;

/// Read side of the engine shared by every HTTP handler.
///
/// Lists and radar frames come from the orchestrator's latest published
/// frame, so the sweep and the devices always belong to the same tick.
#[derive(Clone)]
pub struct BridgeState {
    handle: OrchestratorHandle,
    engine: EngineConfig,
}

fn parse_filter(types: Option<&str>, search: Option<&str>) -> Result<DeviceFilter, StatusCode> {
    DeviceFilter::from_query(types, search).map_err(|_| StatusCode::BAD_REQUEST)
}

impl BridgeState {
    pub fn new(handle: OrchestratorHandle, engine: EngineConfig) -> Self {
        Self { handle, engine }
    }

    pub fn devices(&self, query: &DeviceQuery) -> Result<Vec<DeviceSummary>, StatusCode> {
        let filter = parse_filter(query.types.as_deref(), query.q.as_deref())?;
        let now = self.handle.registry().clock().now();
        let mut devices: Vec<DeviceSummary> = filter
            .apply(self.handle.latest_frame().devices)
            .iter()
            .map(|device| DeviceSummary::from_device(device, now))
            .collect();
        sort_devices(&mut devices, query.sort);
        Ok(devices)
    }

    /// Resolves a MAC from the path to a live device.
    fn live_mac(&self, raw_mac: &str) -> Result<MacAddress, StatusCode> {
        let mac = MacAddress::parse(raw_mac).map_err(|_| StatusCode::BAD_REQUEST)?;
        match self.handle.registry().get(&mac) {
            Some(_) => Ok(mac),
            None => Err(StatusCode::NOT_FOUND),
        }
    }

    pub fn history(&self, raw_mac: &str) -> Result<HistoryView, StatusCode> {
        let mac = self.live_mac(raw_mac)?;
        let samples = self.handle.registry().history(&mac);
        Ok(HistoryView {
            mac: mac.to_string(),
            stats: StatsHelper::summarize(&samples),
            samples,
        })
    }

    /// Projects the latest frame after the type/text filter and the
    /// hide/isolate choices.
    pub fn radar(&self, query: &RadarQuery) -> Result<RadarView, StatusCode> {
        let filter = parse_filter(query.types.as_deref(), query.q.as_deref())?;
        let width = query.width.unwrap_or(DEFAULT_WIDTH).min(MAX_GRID);
        let height = query.height.unwrap_or(DEFAULT_HEIGHT).min(MAX_GRID);
        let frame = self.handle.latest_frame();
        let devices = self.handle.visibility().visible(filter.apply(frame.devices));
        let layout = RadarProjector::new(width, height, &self.engine).project(&devices, &frame.sweep);
        Ok(RadarView::from_layout(&layout, frame.sweep.degrees()))
    }

    pub fn status(&self) -> StatusView {
        let frame = self.handle.latest_frame();
        let visibility = self.handle.visibility();
        StatusView {
            scanning: self.handle.is_scanning(),
            device_count: frame.devices.len(),
            counts: frame.counts,
            metrics: self.handle.metrics().snapshot(),
            sweep_deg: frame.sweep.degrees(),
            hidden: visibility.hidden().iter().map(ToString::to_string).collect(),
            isolated: visibility.isolated().map(|mac| mac.to_string()),
        }
    }

    pub fn set_hidden(&self, raw_mac: &str, hidden: bool) -> Result<StatusView, StatusCode> {
        let mac = self.live_mac(raw_mac)?;
        self.handle.visibility().set_hidden(&mac, hidden);
        log::info!("{} {}", mac, if hidden { "hidden" } else { "shown" });
        Ok(self.status())
    }

    pub fn isolate(&self, raw_mac: Option<&str>) -> Result<StatusView, StatusCode> {
        let mac = raw_mac.map(|raw| self.live_mac(raw)).transpose()?;
        match &mac {
            Some(mac) => log::info!("isolating {}", mac),
            None => log::info!("isolation cleared"),
        }
        self.handle.visibility().isolate(mac);
        Ok(self.status())
    }
}

fn with_state(state: BridgeState) -> impl Filter<Extract = (BridgeState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn reply_or_status<T: Serialize>(result: Result<T, StatusCode>) -> warp::reply::WithStatus<warp::reply::Json> {
    match result {
        Ok(value) => warp::reply::with_status(warp::reply::json(&value), StatusCode::OK),
        Err(status) => warp::reply::with_status(
            warp::reply::json(&json!({ "error": status.canonical_reason().unwrap_or("error") })),
            status,
        ),
    }
}

/// HTTP surface polled by the visualizer.
pub fn routes(state: BridgeState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let devices = warp::path!("devices")
        .and(warp::get())
        .and(warp::query::<DeviceQuery>())
        .and(with_state(state.clone()))
        .map(|query: DeviceQuery, state: BridgeState| reply_or_status(state.devices(&query)));

    let history = warp::path!("devices" / String / "history")
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(|mac: String, state: BridgeState| reply_or_status(state.history(&mac)));

    let hide = warp::path!("devices" / String / "hidden")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .map(|mac: String, toggle: HideToggle, state: BridgeState| {
            reply_or_status(state.set_hidden(&mac, toggle.hidden))
        });

    let isolate = warp::path!("isolate")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .map(|request: IsolateRequest, state: BridgeState| {
            reply_or_status(state.isolate(request.mac.as_deref()))
        });

    let radar = warp::path!("radar")
        .and(warp::get())
        .and(warp::query::<RadarQuery>())
        .and(with_state(state.clone()))
        .map(|query: RadarQuery, state: BridgeState| reply_or_status(state.radar(&query)));

    let status = warp::path!("status")
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(|state: BridgeState| warp::reply::json(&state.status()));

    let scanning = warp::path!("scanning")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state))
        .map(|toggle: ScanToggle, state: BridgeState| {
            state.handle.set_scanning(toggle.enabled);
            log::info!("scanning {}", if toggle.enabled { "resumed" } else { "paused" });
            warp::reply::json(&state.status())
        });

    devices
        .or(history)
        .or(hide)
        .or(isolate)
        .or(radar)
        .or(status)
        .or(scanning)
}

/// Hosts the bridge until the orchestrator shuts down.
pub struct GuiBridge {
    pub addr: SocketAddr,
    pub task: JoinHandle<()>,
}

impl GuiBridge {
    pub fn spawn(state: BridgeState, bind: SocketAddr) -> anyhow::Result<Self> {
        let stop = state.handle.clone();
        let (addr, server) = warp::serve(routes(state))
            .try_bind_with_graceful_shutdown(bind, async move { stop.stopped().await })
            .with_context(|| format!("binding HTTP bridge on {}", bind))?;
        log::info!("HTTP bridge listening on http://{}", addr);
        Ok(Self {
            addr,
            task: tokio::spawn(server),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxcore::{DeviceRegistry, DeviceType, DiscoveryEvent, Orchestrator};
    use std::sync::Arc;
    use std::time::Duration;

    const PHONE: &str = "AA:BB:CC:DD:EE:01";
    const SPEAKER: &str = "AA:BB:CC:DD:EE:02";
    const ROUTER: &str = "AA:BB:CC:DD:EE:03";

    /// Runs an orchestrator over three known devices and waits for the
    /// first frame that carries them.
    async fn running_state() -> BridgeState {
        let engine = EngineConfig::default();
        let registry = Arc::new(DeviceRegistry::new(&engine));
        for (mac, name, rssi, kind) in [
            (PHONE, "Phone", -55.0, DeviceType::Ble),
            (SPEAKER, "", -75.0, DeviceType::Classic),
            (ROUTER, "Laptop", -65.0, DeviceType::WiFi),
        ] {
            registry.apply(&DiscoveryEvent::new(MacAddress::parse(mac).unwrap(), name, rssi, kind));
        }
        let orchestrator = Orchestrator::new(engine.clone(), registry);
        let handle = orchestrator.handle();
        let mut frames = handle.frames();
        tokio::spawn(orchestrator.run());
        tokio::time::timeout(Duration::from_secs(2), async {
            while frames.borrow_and_update().devices.len() < 3 {
                frames.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        BridgeState::new(handle, engine)
    }

    async fn get<T: serde::de::DeserializeOwned>(state: &BridgeState, path: &str) -> T {
        let resp = warp::test::request().path(path).reply(&routes(state.clone())).await;
        assert_eq!(resp.status(), StatusCode::OK, "GET {}", path);
        serde_json::from_slice(resp.body()).unwrap()
    }

    fn macs(devices: &[DeviceSummary]) -> Vec<&str> {
        devices.iter().map(|d| d.mac.as_str()).collect()
    }

    #[tokio::test]
    async fn devices_route_sorts_on_request() {
        let state = running_state().await;

        let devices: Vec<DeviceSummary> = get(&state, "/devices").await;
        assert_eq!(devices[0].name, "Phone");
        assert!(!devices[0].direction.is_empty());
        assert!(["above", "level", "below"].contains(&devices[0].elevation_label.as_str()));

        let devices: Vec<DeviceSummary> = get(&state, "/devices?sort=name").await;
        let names: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Laptop", "Phone", ""]);
    }

    #[tokio::test]
    async fn devices_route_filters_by_type_and_text() {
        let state = running_state().await;
        let filter = routes(state.clone());

        let devices: Vec<DeviceSummary> = get(&state, "/devices?types=ble,wifi").await;
        assert_eq!(macs(&devices), vec![PHONE, ROUTER]);

        let devices: Vec<DeviceSummary> = get(&state, "/devices?q=LAP").await;
        assert_eq!(macs(&devices), vec![ROUTER]);

        let devices: Vec<DeviceSummary> = get(&state, "/devices?q=ee:02").await;
        assert_eq!(macs(&devices), vec![SPEAKER]);

        let devices: Vec<DeviceSummary> = get(&state, "/devices?types=classic&q=phone").await;
        assert!(devices.is_empty());

        let resp = warp::test::request()
            .path("/devices?types=zigbee")
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn history_route_validates_mac() {
        let state = running_state().await;
        let filter = routes(state.clone());

        let view: HistoryView = get(&state, "/devices/aa:bb:cc:dd:ee:01/history").await;
        assert_eq!(view.mac, PHONE);
        assert_eq!(view.samples, vec![-55.0]);
        assert_eq!(view.stats.map(|s| s.max), Some(-55.0));

        let resp = warp::test::request()
            .path("/devices/not-a-mac/history")
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = warp::test::request()
            .path("/devices/00:00:00:00:00:00/history")
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn radar_route_projects_requested_size() {
        let state = running_state().await;

        let view: RadarView = get(&state, "/radar?width=41&height=21").await;
        assert_eq!(view.lines.len(), 21);
        assert!(view.lines.iter().all(|line| line.chars().count() == 41));
        assert_eq!(view.glow.len(), 21);
        assert_eq!(view.markers.len(), 3);

        let view: RadarView = get(&state, "/radar?width=4&height=4").await;
        assert!(view.lines.is_empty());
    }

    #[tokio::test]
    async fn radar_route_applies_filters() {
        let state = running_state().await;

        let view: RadarView = get(&state, "/radar?types=classic").await;
        let marked: Vec<&str> = view.markers.iter().map(|m| m.mac.as_str()).collect();
        assert_eq!(marked, vec![SPEAKER]);

        let view: RadarView = get(&state, "/radar?q=phone").await;
        assert_eq!(view.markers.len(), 1);
        assert_eq!(view.markers[0].mac, PHONE);
    }

    #[tokio::test]
    async fn hidden_devices_stay_listed_but_leave_the_radar() {
        let state = running_state().await;
        let filter = routes(state.clone());

        let resp = warp::test::request()
            .method("POST")
            .path("/devices/aa:bb:cc:dd:ee:01/hidden")
            .json(&json!({ "hidden": true }))
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let status: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(status["hidden"], json!([PHONE]));

        let view: RadarView = get(&state, "/radar").await;
        assert_eq!(view.markers.len(), 2);
        assert!(view.markers.iter().all(|m| m.mac != PHONE));
        let devices: Vec<DeviceSummary> = get(&state, "/devices").await;
        assert_eq!(devices.len(), 3);

        let resp = warp::test::request()
            .method("POST")
            .path("/devices/00:00:00:00:00:09/hidden")
            .json(&json!({ "hidden": true }))
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn isolate_limits_the_radar_to_one_device() {
        let state = running_state().await;
        let filter = routes(state.clone());

        let resp = warp::test::request()
            .method("POST")
            .path("/isolate")
            .json(&json!({ "mac": ROUTER }))
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let view: RadarView = get(&state, "/radar").await;
        let marked: Vec<&str> = view.markers.iter().map(|m| m.mac.as_str()).collect();
        assert_eq!(marked, vec![ROUTER]);
        let view: RadarView = get(&state, "/radar?types=ble").await;
        assert!(view.markers.is_empty());

        let status: serde_json::Value = get(&state, "/status").await;
        assert_eq!(status["isolated"], ROUTER);

        let resp = warp::test::request()
            .method("POST")
            .path("/isolate")
            .json(&json!({ "mac": null }))
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let view: RadarView = get(&state, "/radar").await;
        assert_eq!(view.markers.len(), 3);

        let resp = warp::test::request()
            .method("POST")
            .path("/isolate")
            .json(&json!({ "mac": "nope" }))
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reads_follow_the_published_frame() {
        let engine = EngineConfig::default();
        let registry = Arc::new(DeviceRegistry::new(&engine));
        registry.apply(&DiscoveryEvent::new(
            MacAddress::parse(PHONE).unwrap(),
            "Phone",
            -55.0,
            DeviceType::Ble,
        ));
        // No render tick has run, so the published frame is still empty.
        let state = BridgeState::new(Orchestrator::new(engine.clone(), registry).handle(), engine);

        let view: RadarView = get(&state, "/radar").await;
        assert!(view.markers.is_empty());
        let devices: Vec<DeviceSummary> = get(&state, "/devices").await;
        assert!(devices.is_empty());
        let status: serde_json::Value = get(&state, "/status").await;
        assert_eq!(status["device_count"], 0);
        assert_eq!(status["counts"]["ble"], 0);
    }

    #[tokio::test]
    async fn scanning_toggle_updates_status() {
        let state = running_state().await;
        let handle = state.handle.clone();
        let filter = routes(state.clone());

        let resp = warp::test::request()
            .method("POST")
            .path("/scanning")
            .json(&json!({ "enabled": false }))
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(!handle.is_scanning());

        let status: serde_json::Value = get(&state, "/status").await;
        assert_eq!(status["scanning"], false);
        assert_eq!(status["device_count"], 3);
        assert_eq!(status["counts"]["ble"], 1);
        assert_eq!(status["counts"]["classic"], 1);
        assert_eq!(status["counts"]["wifi"], 1);
        assert_eq!(status["isolated"], serde_json::Value::Null);
    }
}
