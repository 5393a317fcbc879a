use iced::{
    mouse, time,
    widget::{
        button,
        canvas::{self, Canvas, Frame, Geometry, Path, Stroke},
        column, row, scrollable, text, text_input, Column, Container,
    },
    Alignment, Color, Element, Font, Length, Pixels, Point, Rectangle, Renderer, Subscription,
    Task, Theme,
};
use proxcore::math::TraceStats;
use proxcore::registry::TypeCounts;
use proxcore::{DeviceSummary, DeviceType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const RADAR_WIDTH: usize = 61;
const RADAR_HEIGHT: usize = 31;

fn main() -> iced::Result {
    iced::application(Visualizer::boot, Visualizer::update, Visualizer::view)
        .title(application_title)
        .subscription(application_subscription)
        .theme(application_theme)
        .run()
}

fn application_title(_: &Visualizer) -> String {
    "Proximity Radar".into()
}

fn application_subscription(_: &Visualizer) -> Subscription<Message> {
    time::every(Duration::from_millis(100)).map(|_| Message::Tick)
}

fn application_theme(_: &Visualizer) -> Theme {
    Theme::Dark
}

fn bridge_url() -> String {
    std::env::var("RADAR_BRIDGE_URL").unwrap_or_else(|_| "http://127.0.0.1:9000".into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortKey {
    Rssi,
    Name,
    Distance,
    Type,
}

impl SortKey {
    const ALL: [SortKey; 4] = [SortKey::Rssi, SortKey::Name, SortKey::Distance, SortKey::Type];

    fn query(self) -> &'static str {
        match self {
            SortKey::Rssi => "rssi",
            SortKey::Name => "name",
            SortKey::Distance => "distance",
            SortKey::Type => "type",
        }
    }

    fn label(self) -> &'static str {
        match self {
            SortKey::Rssi => "Signal",
            SortKey::Name => "Name",
            SortKey::Distance => "Distance",
            SortKey::Type => "Type",
        }
    }
}

const KINDS: [DeviceType; 3] = [DeviceType::Ble, DeviceType::Classic, DeviceType::WiFi];

/// Type toggles and search text sent as `types=` and `q=`.
#[derive(Debug, Clone, PartialEq)]
struct ListFilter {
    enabled: [bool; 3],
    search: String,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            enabled: [true; 3],
            search: String::new(),
        }
    }
}

impl ListFilter {
    fn slot(kind: DeviceType) -> usize {
        match kind {
            DeviceType::Ble => 0,
            DeviceType::Classic => 1,
            DeviceType::WiFi => 2,
        }
    }

    /// The last enabled type stays on; an empty `types=` means no filtering.
    fn toggle(&mut self, kind: DeviceType) {
        let slot = Self::slot(kind);
        if self.enabled[slot] && self.enabled.iter().filter(|on| **on).count() == 1 {
            return;
        }
        self.enabled[slot] = !self.enabled[slot];
    }

    fn shows(&self, kind: DeviceType) -> bool {
        self.enabled[Self::slot(kind)]
    }

    /// Query pairs; nothing is sent while every type is on and the search
    /// box is empty.
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if self.enabled.iter().any(|on| !on) {
            let types: Vec<String> = KINDS
                .iter()
                .filter(|kind| self.shows(**kind))
                .map(|kind| kind.to_string().to_lowercase())
                .collect();
            params.push(("types", types.join(",")));
        }
        let search = self.search.trim();
        if !search.is_empty() {
            params.push(("q", search.to_string()));
        }
        params
    }
}

/// Subset of `/status` the dashboard shows.
#[derive(Debug, Clone, Default, Deserialize)]
struct StatusSummary {
    scanning: bool,
    device_count: usize,
    counts: TypeCounts,
    #[serde(default)]
    hidden: Vec<String>,
    #[serde(default)]
    isolated: Option<String>,
}

fn format_age(age_secs: f64) -> String {
    if age_secs < 1.0 {
        "now".into()
    } else if age_secs < 60.0 {
        format!("{}s ago", age_secs as u64)
    } else {
        format!("{}m ago", (age_secs / 60.0) as u64)
    }
}

fn detail_line(device: &DeviceSummary) -> String {
    format!(
        "Direction {}  Elevation {}  Seen {}",
        device.direction,
        device.elevation_label,
        format_age(device.age_secs)
    )
}

#[derive(Debug)]
struct Visualizer {
    radar: Option<RadarView>,
    devices: Vec<DeviceSummary>,
    sort: SortKey,
    filter: ListFilter,
    selected: Option<String>,
    trace: Option<HistoryView>,
    scanning: bool,
    hidden: Vec<String>,
    isolated: Option<String>,
    status: String,
    history: Vec<String>,
}

#[derive(Debug, Clone)]
enum Message {
    Tick,
    RadarFetched(Result<RadarView, String>),
    DevicesFetched(Result<Vec<DeviceSummary>, String>),
    StatusFetched(Result<StatusSummary, String>),
    TraceFetched(Result<HistoryView, String>),
    SortChanged(SortKey),
    TypeToggled(DeviceType),
    SearchChanged(String),
    DeviceSelected(String),
    ToggleScanning,
    ScanningSet(Result<bool, String>),
    ToggleHidden,
    ToggleIsolate,
    VisibilitySet(Result<StatusSummary, String>),
}

impl Visualizer {
    fn boot() -> (Self, Task<Message>) {
        (
            Visualizer {
                radar: None,
                devices: Vec::new(),
                sort: SortKey::Rssi,
                filter: ListFilter::default(),
                selected: None,
                trace: None,
                scanning: true,
                hidden: Vec::new(),
                isolated: None,
                status: "Waiting for the radar bridge...".into(),
                history: Vec::new(),
            },
            Task::perform(fetch_radar(ListFilter::default()), Message::RadarFetched),
        )
    }

    fn update(state: &mut Self, message: Message) -> Task<Message> {
        match message {
            Message::Tick => {
                let mut tasks = vec![
                    Task::perform(fetch_radar(state.filter.clone()), Message::RadarFetched),
                    Task::perform(
                        fetch_devices(state.sort, state.filter.clone()),
                        Message::DevicesFetched,
                    ),
                    Task::perform(fetch_status(), Message::StatusFetched),
                ];
                if let Some(mac) = state.selected.clone() {
                    tasks.push(Task::perform(fetch_trace(mac), Message::TraceFetched));
                }
                Task::batch(tasks)
            }
            Message::RadarFetched(Ok(radar)) => {
                state.radar = Some(radar);
                Task::none()
            }
            Message::RadarFetched(Err(err)) => {
                state.status = format!("Bridge error: {err}");
                Task::none()
            }
            Message::DevicesFetched(Ok(devices)) => {
                if let Some(mac) = &state.selected {
                    if !devices.iter().any(|d| &d.mac == mac) {
                        state.push_history(format!("{mac} no longer listed"));
                        state.selected = None;
                        state.trace = None;
                    }
                }
                state.devices = devices;
                Task::none()
            }
            Message::StatusFetched(Ok(summary)) => {
                state.apply_status(summary);
                Task::none()
            }
            Message::StatusFetched(Err(err)) => {
                state.status = format!("Bridge error: {err}");
                Task::none()
            }
            Message::DevicesFetched(Err(err)) => {
                state.status = format!("Bridge error: {err}");
                Task::none()
            }
            Message::TraceFetched(Ok(trace)) => {
                if state.selected.as_deref() == Some(trace.mac.as_str()) {
                    state.trace = Some(trace);
                }
                Task::none()
            }
            Message::TraceFetched(Err(_)) => {
                state.trace = None;
                Task::none()
            }
            Message::SortChanged(sort) => {
                state.sort = sort;
                Task::perform(fetch_devices(sort, state.filter.clone()), Message::DevicesFetched)
            }
            Message::TypeToggled(kind) => {
                state.filter.toggle(kind);
                Task::perform(
                    fetch_devices(state.sort, state.filter.clone()),
                    Message::DevicesFetched,
                )
            }
            Message::SearchChanged(search) => {
                state.filter.search = search;
                Task::perform(
                    fetch_devices(state.sort, state.filter.clone()),
                    Message::DevicesFetched,
                )
            }
            Message::ToggleHidden => match state.selected.clone() {
                Some(mac) => {
                    let hide = !state.hidden.contains(&mac);
                    state.push_history(format!("{} {mac}", if hide { "Hiding" } else { "Showing" }));
                    Task::perform(post_hidden(mac, hide), Message::VisibilitySet)
                }
                None => Task::none(),
            },
            Message::ToggleIsolate => match state.selected.clone() {
                Some(mac) => {
                    let target = if state.isolated.as_deref() == Some(mac.as_str()) {
                        state.push_history("Isolation cleared".into());
                        None
                    } else {
                        state.push_history(format!("Isolating {mac}"));
                        Some(mac)
                    };
                    Task::perform(post_isolate(target), Message::VisibilitySet)
                }
                None => Task::none(),
            },
            Message::VisibilitySet(Ok(summary)) => {
                state.apply_status(summary);
                Task::none()
            }
            Message::VisibilitySet(Err(err)) => {
                state.status = format!("Visibility error: {err}");
                Task::none()
            }
            Message::DeviceSelected(mac) => {
                state.push_history(format!("Tracking {mac}"));
                state.selected = Some(mac.clone());
                state.trace = None;
                Task::perform(fetch_trace(mac), Message::TraceFetched)
            }
            Message::ToggleScanning => Task::perform(post_scanning(!state.scanning), Message::ScanningSet),
            Message::ScanningSet(Ok(enabled)) => {
                state.scanning = enabled;
                state.push_history(if enabled { "Scanning resumed" } else { "Scanning paused" }.into());
                Task::none()
            }
            Message::ScanningSet(Err(err)) => {
                state.status = format!("Toggle error: {err}");
                Task::none()
            }
        }
    }

    fn view(state: &Self) -> Element<'_, Message> {
        let radar = Canvas::new(RadarCanvas {
            view: state.radar.clone().unwrap_or_default(),
        })
        .width(Length::Fixed(640.0))
        .height(Length::Fixed(640.0));

        let sweep = state
            .radar
            .as_ref()
            .map(|radar| format!("Sweep {:>5.1}°", radar.sweep_deg))
            .unwrap_or_else(|| "Sweep n/a".into());

        let radar_column = column![
            text("Radar").size(26),
            radar,
            text(sweep).size(14),
            text(&state.status).size(14),
            button(if state.scanning { "Pause scan" } else { "Resume scan" })
                .on_press(Message::ToggleScanning)
                .padding(10),
        ]
        .spacing(10)
        .padding(16);

        let sort_row = SortKey::ALL.iter().fold(row![].spacing(6), |row, key| {
            let label = if *key == state.sort {
                format!("[{}]", key.label())
            } else {
                key.label().to_string()
            };
            row.push(button(text(label).size(12)).on_press(Message::SortChanged(*key)))
        });

        let type_row = KINDS.iter().fold(row![].spacing(6), |row, kind| {
            let label = if state.filter.shows(*kind) {
                format!("[{}]", kind)
            } else {
                kind.to_string()
            };
            row.push(button(text(label).size(12)).on_press(Message::TypeToggled(*kind)))
        });
        let search = text_input("Search name or MAC", &state.filter.search)
            .on_input(Message::SearchChanged)
            .size(12)
            .padding(6);

        let device_list = if state.devices.is_empty() {
            Column::new().push(text("No devices in range").size(12))
        } else {
            state
                .devices
                .iter()
                .fold(Column::new().spacing(2), |col, device| {
                    let marker = if state.selected.as_deref() == Some(device.mac.as_str()) {
                        ">"
                    } else if state.hidden.contains(&device.mac) {
                        "-"
                    } else {
                        " "
                    };
                    let name = if device.name.is_empty() {
                        "[unnamed]"
                    } else {
                        device.name.as_str()
                    };
                    let band = if device.band.is_empty() {
                        String::new()
                    } else {
                        format!(" {} ch{}", device.band, device.channel)
                    };
                    col.push(
                        button(
                            text(format!(
                                "{marker} {:<7} {:<20} {:>4.0} dBm {:>5.1} m{band}",
                                device.kind.to_string(),
                                name,
                                device.rssi,
                                device.distance
                            ))
                            .font(Font::MONOSPACE)
                            .size(12),
                        )
                        .on_press(Message::DeviceSelected(device.mac.clone()))
                        .width(Length::Fill),
                    )
                })
        };

        let trace_title = match (&state.selected, &state.trace) {
            (Some(mac), Some(HistoryView { stats: Some(stats), .. })) => format!(
                "Signal {mac}: mean {:.1} / min {:.0} / max {:.0} / σ {:.1} dBm",
                stats.mean, stats.min, stats.max, stats.std_dev
            ),
            (Some(mac), _) => format!("Signal {mac}"),
            (None, _) => "Select a device to trace its signal".into(),
        };
        let selected_device = state
            .selected
            .as_ref()
            .and_then(|mac| state.devices.iter().find(|d| &d.mac == mac));
        let detail = selected_device
            .map(detail_line)
            .unwrap_or_default();
        let selected_hidden = state
            .selected
            .as_ref()
            .is_some_and(|mac| state.hidden.contains(mac));
        let selected_isolated = state.selected.is_some() && state.selected == state.isolated;
        let mut visibility_row = row![].spacing(6);
        if state.selected.is_some() {
            visibility_row = visibility_row
                .push(
                    button(text(if selected_hidden { "Show on radar" } else { "Hide from radar" }).size(12))
                        .on_press(Message::ToggleHidden),
                )
                .push(
                    button(text(if selected_isolated { "Show all" } else { "Isolate" }).size(12))
                        .on_press(Message::ToggleIsolate),
                );
        }

        let trace = Canvas::new(Trace {
            data: state
                .trace
                .as_ref()
                .map(|trace| trace.samples.clone())
                .unwrap_or_default(),
        })
        .width(Length::Fill)
        .height(Length::Fixed(160.0));

        let history_list = if state.history.is_empty() {
            Column::new().push(text("No activity yet").size(12))
        } else {
            state
                .history
                .iter()
                .rev()
                .fold(Column::new().spacing(4), |col, entry| {
                    col.push(text(entry.clone()).size(12))
                })
        };

        let device_column = column![
            text("Devices").size(26),
            sort_row,
            type_row,
            search,
            Container::new(scrollable(device_list).height(Length::Fixed(280.0))).padding(6),
            text(trace_title).size(14),
            text(detail).size(13),
            visibility_row,
            trace,
            text("Activity log").size(16),
            Container::new(scrollable(history_list).height(Length::Fixed(90.0))).padding(6),
        ]
        .spacing(10)
        .padding(16)
        .width(Length::Fill);

        let layout = row![radar_column, device_column]
            .spacing(20)
            .align_y(Alignment::Start)
            .padding(20);

        Container::new(layout)
            .width(Length::Fill)
            .height(Length::Fill)
            .center_y(Length::Fill)
            .into()
    }

    fn apply_status(&mut self, summary: StatusSummary) {
        self.scanning = summary.scanning;
        self.hidden = summary.hidden;
        self.isolated = summary.isolated;
        self.status = format!(
            "{} devices  BLE {}  Classic {}  WiFi {}{}{}",
            summary.device_count,
            summary.counts.ble,
            summary.counts.classic,
            summary.counts.wifi,
            if self.scanning { "" } else { "  [PAUSED]" },
            if self.isolated.is_some() { "  [ISOLATED]" } else { "" }
        );
    }

    fn push_history(&mut self, entry: String) {
        self.history.push(entry);
        if self.history.len() > 20 {
            self.history.remove(0);
        }
    }
}

fn bridge_endpoint(path: &str, mut params: Vec<(&'static str, String)>, filter: &ListFilter) -> Result<reqwest::Url, String> {
    params.extend(filter.params());
    reqwest::Url::parse_with_params(&format!("{}{}", bridge_url(), path), &params).map_err(|e| e.to_string())
}

async fn fetch_radar(filter: ListFilter) -> Result<RadarView, String> {
    let params = vec![
        ("width", RADAR_WIDTH.to_string()),
        ("height", RADAR_HEIGHT.to_string()),
    ];
    let url = bridge_endpoint("/radar", params, &filter)?;
    let response = reqwest::get(url).await.map_err(|e| e.to_string())?;
    response.json::<RadarView>().await.map_err(|e| e.to_string())
}

async fn fetch_devices(sort: SortKey, filter: ListFilter) -> Result<Vec<DeviceSummary>, String> {
    let url = bridge_endpoint("/devices", vec![("sort", sort.query().to_string())], &filter)?;
    let response = reqwest::get(url).await.map_err(|e| e.to_string())?;
    response
        .json::<Vec<DeviceSummary>>()
        .await
        .map_err(|e| e.to_string())
}

async fn fetch_status() -> Result<StatusSummary, String> {
    let response = reqwest::get(format!("{}/status", bridge_url()))
        .await
        .map_err(|e| e.to_string())?;
    response.json::<StatusSummary>().await.map_err(|e| e.to_string())
}

async fn post_visibility(path: String, body: serde_json::Value) -> Result<StatusSummary, String> {
    let response = reqwest::Client::new()
        .post(format!("{}{}", bridge_url(), path))
        .json(&body)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(response.status().to_string());
    }
    response.json::<StatusSummary>().await.map_err(|e| e.to_string())
}

async fn post_hidden(mac: String, hidden: bool) -> Result<StatusSummary, String> {
    post_visibility(format!("/devices/{mac}/hidden"), serde_json::json!({ "hidden": hidden })).await
}

async fn post_isolate(mac: Option<String>) -> Result<StatusSummary, String> {
    post_visibility("/isolate".into(), serde_json::json!({ "mac": mac })).await
}

async fn fetch_trace(mac: String) -> Result<HistoryView, String> {
    let url = format!("{}/devices/{}/history", bridge_url(), mac);
    let response = reqwest::get(url).await.map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(response.status().to_string());
    }
    response.json::<HistoryView>().await.map_err(|e| e.to_string())
}

async fn post_scanning(enabled: bool) -> Result<bool, String> {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/scanning", bridge_url()))
        .json(&ScanToggle { enabled })
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if response.status().is_success() {
        Ok(enabled)
    } else {
        let status = response.status();
        let text = response.text().await.unwrap_or_else(|_| "".into());
        Err(format!("{}: {}", status, text))
    }
}

#[derive(Debug, Serialize)]
struct ScanToggle {
    enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct LabelView {
    text: String,
    col: i32,
    row: i32,
}

#[derive(Debug, Clone, Deserialize)]
struct MarkerView {
    kind: DeviceType,
    named: bool,
    col: i32,
    row: i32,
    label: Option<LabelView>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RadarView {
    #[serde(default)]
    sweep_deg: f64,
    #[serde(default)]
    lines: Vec<String>,
    #[serde(default)]
    glow: Vec<String>,
    #[serde(default)]
    markers: Vec<MarkerView>,
}

#[derive(Debug, Clone, Deserialize)]
struct HistoryView {
    mac: String,
    #[serde(default)]
    samples: Vec<f64>,
    stats: Option<TraceStats>,
}

fn kind_color(kind: DeviceType) -> Color {
    match kind {
        DeviceType::Ble => Color::from_rgb(0.3, 1.0, 0.4),
        DeviceType::Classic => Color::from_rgb(0.35, 0.7, 1.0),
        DeviceType::WiFi => Color::from_rgb(1.0, 0.75, 0.25),
    }
}

/// Background green, brightened by the sweep glow digit.
fn glow_color(level: u32) -> Color {
    let glow = level.min(9) as f32 / 9.0;
    Color::from_rgb(0.05 + 0.45 * glow, 0.35 + 0.65 * glow, 0.1 + 0.3 * glow)
}

/// Foreground colour for every marker and label cell.
fn overlay_colors(markers: &[MarkerView]) -> HashMap<(i32, i32), Color> {
    let mut colors = HashMap::new();
    for marker in markers {
        if let Some(label) = &marker.label {
            let color = if marker.named {
                Color::from_rgb(0.85, 0.95, 0.85)
            } else {
                Color::from_rgb(0.55, 0.6, 0.55)
            };
            for offset in 0..label.text.chars().count() as i32 {
                colors.insert((label.col + offset, label.row), color);
            }
        }
    }
    for marker in markers {
        colors.insert((marker.col, marker.row), kind_color(marker.kind));
    }
    colors
}

#[derive(Clone)]
struct RadarCanvas {
    view: RadarView,
}

impl canvas::Program<Message> for RadarCanvas {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());
        frame.fill_rectangle(Point::ORIGIN, bounds.size(), Color::from_rgb(0.0, 0.03, 0.0));

        let rows = self.view.lines.len();
        let cols = self.view.lines.first().map(|l| l.chars().count()).unwrap_or(0);
        if rows == 0 || cols == 0 {
            return vec![frame.into_geometry()];
        }
        let cell_w = bounds.width / cols as f32;
        let cell_h = bounds.height / rows as f32;
        let overlay = overlay_colors(&self.view.markers);

        for (row, (line, glow)) in self.view.lines.iter().zip(&self.view.glow).enumerate() {
            for (col, (glyph, level)) in line.chars().zip(glow.chars()).enumerate() {
                if glyph == ' ' {
                    continue;
                }
                let level = level.to_digit(10).unwrap_or(0);
                let color = overlay
                    .get(&(col as i32, row as i32))
                    .copied()
                    .unwrap_or_else(|| glow_color(level));
                frame.fill_text(canvas::Text {
                    content: glyph.to_string(),
                    position: Point::new(col as f32 * cell_w, row as f32 * cell_h),
                    color,
                    size: Pixels(cell_h.min(cell_w * 1.8)),
                    font: Font::MONOSPACE,
                    ..canvas::Text::default()
                });
            }
        }

        vec![frame.into_geometry()]
    }
}

#[derive(Clone)]
struct Trace {
    data: Vec<f64>,
}

impl canvas::Program<Message> for Trace {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());
        frame.fill_rectangle(
            Point::ORIGIN,
            bounds.size(),
            Color::from_rgb(0.05, 0.05, 0.05),
        );

        if self.data.len() > 1 {
            let min = self.data.iter().cloned().fold(f64::INFINITY, f64::min) as f32;
            let max = self.data.iter().cloned().fold(f64::NEG_INFINITY, f64::max) as f32;
            let range = (max - min).max(1.0);
            let step = bounds.width / (self.data.len() as f32 - 1.0);
            let path = Path::new(|builder| {
                for (i, value) in self.data.iter().enumerate() {
                    let x = i as f32 * step;
                    let normalized = (*value as f32 - min) / range;
                    let y = bounds.height - normalized * bounds.height;
                    if i == 0 {
                        builder.move_to(Point::new(x, y));
                    } else {
                        builder.line_to(Point::new(x, y));
                    }
                }
            });

            frame.stroke(
                &path,
                Stroke::default()
                    .with_width(2.0)
                    .with_color(Color::from_rgb(0.3, 1.0, 0.4)),
            );
        }

        vec![frame.into_geometry()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_keys_map_to_bridge_queries() {
        let queries: Vec<&str> = SortKey::ALL.iter().map(|k| k.query()).collect();
        assert_eq!(queries, vec!["rssi", "name", "distance", "type"]);
    }

    #[test]
    fn markers_win_over_labels() {
        let markers = vec![
            MarkerView {
                kind: DeviceType::Ble,
                named: true,
                col: 10,
                row: 5,
                label: Some(LabelView {
                    text: "Phone".into(),
                    col: 12,
                    row: 5,
                }),
            },
            MarkerView {
                kind: DeviceType::WiFi,
                named: false,
                col: 14,
                row: 5,
                label: None,
            },
        ];
        let colors = overlay_colors(&markers);
        assert_eq!(colors.get(&(10, 5)), Some(&kind_color(DeviceType::Ble)));
        assert_eq!(colors.get(&(14, 5)), Some(&kind_color(DeviceType::WiFi)));
        assert_eq!(colors.get(&(12, 5)), Some(&Color::from_rgb(0.85, 0.95, 0.85)));
        assert!(colors.get(&(17, 5)).is_none());
    }

    #[test]
    fn filter_params_follow_toggles_and_search() {
        let mut filter = ListFilter::default();
        assert!(filter.params().is_empty());

        filter.toggle(DeviceType::Classic);
        filter.search = "  buds ".into();
        assert_eq!(
            filter.params(),
            vec![("types", "ble,wifi".to_string()), ("q", "buds".to_string())]
        );

        filter.toggle(DeviceType::Classic);
        assert_eq!(filter.params(), vec![("q", "buds".to_string())]);

        filter.toggle(DeviceType::Ble);
        filter.toggle(DeviceType::Classic);
        filter.toggle(DeviceType::WiFi);
        assert!(filter.shows(DeviceType::WiFi));
        assert_eq!(filter.params()[0], ("types", "wifi".to_string()));
    }

    #[test]
    fn detail_line_shows_bearing_elevation_and_age() {
        let device = DeviceSummary {
            mac: "AA:BB:CC:DD:EE:FF".into(),
            name: "Tag".into(),
            kind: DeviceType::Ble,
            rssi: -60.0,
            distance: 1.6,
            angle_deg: 45.0,
            elevation: 0.5,
            direction: "NE".into(),
            elevation_label: "above".into(),
            frequency: 0,
            channel: 0,
            band: String::new(),
            age_secs: 12.4,
        };
        assert_eq!(detail_line(&device), "Direction NE  Elevation above  Seen 12s ago");
        assert_eq!(format_age(0.3), "now");
        assert_eq!(format_age(125.0), "2m ago");
    }

    #[test]
    fn status_summary_reads_bridge_status() {
        let summary: StatusSummary = serde_json::from_str(
            r#"{"scanning":false,"device_count":2,"counts":{"ble":1,"classic":0,"wifi":1},
                "metrics":{},"sweep_deg":12.0,"hidden":["AA:BB:CC:DD:EE:FF"],"isolated":null}"#,
        )
        .unwrap();
        let mut state = Visualizer::boot().0;
        state.apply_status(summary);
        assert!(!state.scanning);
        assert_eq!(state.hidden, vec!["AA:BB:CC:DD:EE:FF"]);
        assert_eq!(state.status, "2 devices  BLE 1  Classic 0  WiFi 1  [PAUSED]");
    }

    #[test]
    fn glow_brightens_with_level() {
        assert!(glow_color(9).g > glow_color(0).g);
        assert_eq!(glow_color(12), glow_color(9));
    }

    #[test]
    fn radar_view_tolerates_partial_payloads() {
        let view: RadarView = serde_json::from_str(r#"{"lines":["+"]}"#).unwrap();
        assert_eq!(view.lines, vec!["+"]);
        assert!(view.markers.is_empty());
    }
}
