use proxcore::discovery::{program_available, AdapterFeed, AdvertisementReport, ReportCallback};
use proxcore::{EngineError, EngineResult};
use std::collections::{HashMap, VecDeque};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Addresses whose name or vendor the parser keeps at once.
const TRACKED_ADDRESSES: usize = 1024;
const QUIT_GRACE: Duration = Duration::from_secs(2);

/// Removes ANSI colour sequences and readline prompts bluetoothctl mixes
/// into its output.
fn strip_control(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\u{1b}' => {
                if chars.peek() == Some(&'[') {
                    chars.next();
                    for c in chars.by_ref() {
                        if c.is_ascii_alphabetic() {
                            break;
                        }
                    }
                }
            }
            '\u{1}' | '\u{2}' | '\r' => {}
            other => out.push(other),
        }
    }
    out
}

/// Parses `RSSI: -67` and the newer `RSSI: 0xffffffbd (-67)`.
fn parse_rssi(value: &str) -> Option<i16> {
    let value = value.trim();
    if let Some(start) = value.find('(') {
        let end = value[start..].find(')')? + start;
        return value[start + 1..end].trim().parse().ok();
    }
    value.parse().ok()
}

/// Stateful reader of `bluetoothctl` scan output.
///
/// Names and manufacturer IDs arrive on their own lines, so they are
/// remembered per address and attached to the next RSSI update. At most
/// `capacity` addresses are remembered; the oldest is forgotten first.
#[derive(Debug)]
pub struct BluetoothctlParser {
    names: HashMap<String, String>,
    vendors: HashMap<String, u16>,
    order: VecDeque<String>,
    capacity: usize,
}

impl Default for BluetoothctlParser {
    fn default() -> Self {
        Self::with_capacity(TRACKED_ADDRESSES)
    }
}

impl BluetoothctlParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            names: HashMap::new(),
            vendors: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn tracked(&self) -> usize {
        self.order.len()
    }

    fn track(&mut self, address: &str) {
        if self.names.contains_key(address) || self.vendors.contains_key(address) {
            return;
        }
        self.order.push_back(address.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.names.remove(&oldest);
                self.vendors.remove(&oldest);
            }
        }
    }

    fn forget(&mut self, address: &str) {
        self.names.remove(address);
        self.vendors.remove(address);
        self.order.retain(|tracked| tracked != address);
    }

    fn remember_name(&mut self, address: String, name: &str) {
        self.track(&address);
        self.names.insert(address, name.to_string());
    }

    pub fn feed_line(&mut self, raw: &str) -> Option<AdvertisementReport> {
        let line = strip_control(raw);
        let line = line.trim();
        let start = line.find("Device ")?;
        let tag = line[..start].trim();
        let rest = &line[start + "Device ".len()..];
        let (address, detail) = match rest.split_once(' ') {
            Some((address, detail)) => (address.to_string(), detail.trim()),
            None => (rest.to_string(), ""),
        };

        if tag.ends_with("[DEL]") {
            self.forget(&address);
            return None;
        }
        if tag.ends_with("[NEW]") {
            // Unnamed devices are announced with their address in dash form.
            if !detail.is_empty() && detail != address.replace(':', "-") {
                self.remember_name(address, detail);
            }
            return None;
        }

        if let Some(name) = detail.strip_prefix("Name: ").or_else(|| detail.strip_prefix("Alias: ")) {
            if name.trim() != address.replace(':', "-") {
                self.remember_name(address, name.trim());
            }
            return None;
        }
        if let Some(key) = detail.strip_prefix("ManufacturerData Key: ") {
            let key = key.trim();
            let id = key
                .strip_prefix("0x")
                .and_then(|hex| u16::from_str_radix(hex, 16).ok())
                .or_else(|| key.parse().ok());
            if let Some(id) = id {
                self.track(&address);
                self.vendors.insert(address, id);
            }
            return None;
        }
        let rssi = parse_rssi(detail.strip_prefix("RSSI: ")?)?;
        Some(AdvertisementReport {
            local_name: self.names.get(&address).cloned(),
            manufacturer_id: self.vendors.get(&address).copied(),
            address,
            rssi,
        })
    }
}

/// Live BLE advertisements read from an interactive `bluetoothctl` session.
pub struct BluetoothctlFeed {
    program: String,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl BluetoothctlFeed {
    pub fn new() -> Self {
        Self {
            program: "bluetoothctl".into(),
            cancel: None,
            task: None,
        }
    }

    fn spawn_child(&self) -> EngineResult<Child> {
        Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| EngineError::SourceUnavailable(format!("{}: {}", self.program, err)))
    }
}

impl Default for BluetoothctlFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns scanning off and lets the session exit before the child is
/// dropped; a session that ignores `quit` is killed.
async fn end_session(mut child: Child, stdin: Option<ChildStdin>) {
    if let Some(mut stdin) = stdin {
        if let Err(err) = stdin.write_all(b"scan off\nquit\n").await {
            log::debug!("bluetoothctl: could not stop scan: {}", err);
        }
        let _ = stdin.flush().await;
    }
    match tokio::time::timeout(QUIT_GRACE, child.wait()).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => log::debug!("bluetoothctl: {}", err),
        Err(_) => {
            log::warn!("bluetoothctl ignored quit; killing it");
            let _ = child.kill().await;
        }
    }
}

async fn read_session(mut child: Child, callback: ReportCallback, cancel: CancellationToken) {
    // Dropping stdin would end the interactive session, so it lives as long
    // as the read loop.
    let mut stdin = child.stdin.take();
    if let Some(input) = stdin.as_mut() {
        if let Err(err) = input.write_all(b"scan on\n").await {
            log::warn!("bluetoothctl: could not start scan: {}", err);
            return;
        }
    }
    let Some(stdout) = child.stdout.take() else {
        end_session(child, stdin).await;
        return;
    };

    let mut parser = BluetoothctlParser::new();
    let mut lines = BufReader::new(stdout).lines();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                end_session(child, stdin).await;
                return;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(report) = parser.feed_line(&line) {
                        callback(report);
                    }
                }
                Ok(None) => {
                    log::warn!("bluetoothctl exited");
                    break;
                }
                Err(err) => {
                    log::debug!("bluetoothctl: {}", err);
                    break;
                }
            },
        }
    }
}

impl AdapterFeed for BluetoothctlFeed {
    fn subscribe(&mut self, callback: ReportCallback) -> EngineResult<()> {
        if !program_available(&self.program) {
            return Err(EngineError::SourceUnavailable(format!(
                "{} not found on PATH",
                self.program
            )));
        }
        let handle = Handle::try_current()
            .map_err(|_| EngineError::SourceUnavailable("no async runtime available".into()))?;
        let child = {
            let _guard = handle.enter();
            self.spawn_child()?
        };
        let cancel = CancellationToken::new();
        self.task = Some(handle.spawn(read_session(child, callback, cancel.clone())));
        self.cancel = Some(cancel);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.task.take();
    }
}
