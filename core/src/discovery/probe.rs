use crate::device::DiscoveryEvent;
use crate::discovery::EventSink;
use crate::prelude::{DiscoverySource, EngineError, EngineResult};
use crate::telemetry::LogManager;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;

pub type ProbeParser = fn(&str) -> Vec<DiscoveryEvent>;

/// An external command run on a fixed cadence whose output is parsed into
/// discovery events.
#[derive(Debug, Clone)]
pub struct ProbeSpec {
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
    pub interval: Duration,
    pub timeout: Duration,
    pub parser: ProbeParser,
}

impl ProbeSpec {
    pub fn new(
        label: impl Into<String>,
        program: impl Into<String>,
        args: &[&str],
        parser: ProbeParser,
    ) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            interval: Duration::from_secs(8),
            timeout: Duration::from_secs(15),
            parser,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// True when `program` resolves to a file on `PATH` (or is an existing path).
pub fn program_available(program: &str) -> bool {
    if program.contains('/') {
        return Path::new(program).is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

/// Runs the probe once. Non-zero exit, timeout and non-UTF-8 output are
/// scan failures.
pub async fn run_probe(spec: &ProbeSpec) -> EngineResult<Vec<DiscoveryEvent>> {
    let child = Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| EngineError::ScanFailure(format!("{}: {}", spec.program, err)))?;

    let output = timeout(spec.timeout, child.wait_with_output())
        .await
        .map_err(|_| {
            EngineError::ScanFailure(format!("{} timed out after {:?}", spec.program, spec.timeout))
        })?
        .map_err(|err| EngineError::ScanFailure(format!("{}: {}", spec.program, err)))?;

    if !output.status.success() {
        return Err(EngineError::ScanFailure(format!(
            "{} exited with {}",
            spec.program, output.status
        )));
    }
    let text = String::from_utf8(output.stdout)
        .map_err(|_| EngineError::ScanFailure(format!("{} wrote non-UTF-8 output", spec.program)))?;
    Ok((spec.parser)(&text))
}

/// Periodic probe source. Each cycle runs the command, emits whatever parsed,
/// then waits out the rest of the interval.
pub struct ProbeSource {
    spec: ProbeSpec,
    sink: Option<EventSink>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl ProbeSource {
    pub fn new(spec: ProbeSpec) -> Self {
        Self {
            spec,
            sink: None,
            cancel: None,
            task: None,
        }
    }

    pub fn spec(&self) -> &ProbeSpec {
        &self.spec
    }
}

async fn probe_loop(spec: ProbeSpec, sink: EventSink, cancel: CancellationToken) {
    let logger = LogManager::new("probe");
    loop {
        let cycle_start = Instant::now();
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = run_probe(&spec) => match result {
                Ok(events) => {
                    logger.debug(&format!("{}: {} record(s)", spec.label, events.len()));
                    for event in events {
                        if !sink.send(event) {
                            return;
                        }
                    }
                }
                Err(err) => logger.debug(&format!("{}: {}", spec.label, err)),
            },
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep_until(cycle_start + spec.interval) => {}
        }
    }
}

impl DiscoverySource for ProbeSource {
    fn name(&self) -> &str {
        &self.spec.label
    }

    fn start(&mut self, sink: EventSink) -> EngineResult<()> {
        if self.task.is_some() {
            return Err(EngineError::SourceUnavailable(format!(
                "{} already started",
                self.spec.label
            )));
        }
        let handle = Handle::try_current()
            .map_err(|_| EngineError::SourceUnavailable("no async runtime available".into()))?;
        let cancel = CancellationToken::new();
        let task = handle.spawn(probe_loop(self.spec.clone(), sink.clone(), cancel.clone()));
        self.sink = Some(sink);
        self.cancel = Some(cancel);
        self.task = Some(task);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(sink) = self.sink.take() {
            sink.close();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ProbeSource {
    fn drop(&mut self) {
        self.stop();
    }
}
