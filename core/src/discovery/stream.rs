use crate::device::{lookup_manufacturer, DeviceType, DiscoveryEvent, MacAddress};
use crate::discovery::EventSink;
use crate::prelude::{DiscoverySource, EngineError, EngineResult};
use crate::telemetry::LogManager;

/// One decoded advertisement as delivered by a live adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvertisementReport {
    pub address: String,
    pub local_name: Option<String>,
    pub rssi: i16,
    pub manufacturer_id: Option<u16>,
}

pub type ReportCallback = Box<dyn Fn(AdvertisementReport) + Send + Sync>;

/// A callback-driven feed of advertisements, e.g. a BLE adapter.
pub trait AdapterFeed: Send {
    fn subscribe(&mut self, callback: ReportCallback) -> EngineResult<()>;
    fn unsubscribe(&mut self);
}

/// Turns a report into a BLE event, naming anonymous devices after their
/// vendor (`"Apple EE:FF"`) when the company ID is known.
pub fn report_to_event(report: &AdvertisementReport) -> EngineResult<DiscoveryEvent> {
    let mac = MacAddress::parse(&report.address)?;
    let mut name = report
        .local_name
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if name.is_empty() {
        if let Some(vendor) = report.manufacturer_id.and_then(lookup_manufacturer) {
            name = format!("{} {}", vendor, mac.suffix());
        }
    }
    Ok(DiscoveryEvent::new(mac, name, report.rssi as f64, DeviceType::Ble))
}

/// Forwards every report from a live feed as soon as it arrives.
pub struct StreamSource<F: AdapterFeed> {
    name: String,
    feed: F,
    sink: Option<EventSink>,
    logger: LogManager,
}

impl<F: AdapterFeed> StreamSource<F> {
    pub fn new(name: impl Into<String>, feed: F) -> Self {
        Self {
            name: name.into(),
            feed,
            sink: None,
            logger: LogManager::new("stream"),
        }
    }
}

impl<F: AdapterFeed> DiscoverySource for StreamSource<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, sink: EventSink) -> EngineResult<()> {
        if self.sink.is_some() {
            return Err(EngineError::SourceUnavailable(format!(
                "{} already started",
                self.name
            )));
        }
        let forward = sink.clone();
        let callback: ReportCallback = Box::new(move |report| match report_to_event(&report) {
            Ok(event) => {
                forward.send(event);
            }
            Err(err) => log::debug!("stream: {}", err),
        });
        self.feed.subscribe(callback)?;
        self.logger.record(&format!("{} subscribed", self.name));
        self.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.close();
            self.feed.unsubscribe();
            self.logger.record(&format!("{} unsubscribed", self.name));
        }
    }
}
