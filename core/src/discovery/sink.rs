use crate::device::DiscoveryEvent;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;

/// Open/closed switch shared by one sink and every envelope it produced.
#[derive(Debug)]
struct Gate {
    open: RwLock<bool>,
}

impl Gate {
    fn new() -> Self {
        Self {
            open: RwLock::new(true),
        }
    }
}

/// Producer handle into the orchestrator's event queue.
///
/// Clones share one gate. Closing it rejects further sends and makes the
/// consumer discard anything still queued from this sink, so a stopped
/// source cannot touch the registry afterwards.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Envelope>,
    gate: Arc<Gate>,
}

impl EventSink {
    /// Queues an event. Returns false once the sink is closed or the
    /// consumer is gone.
    pub fn send(&self, event: DiscoveryEvent) -> bool {
        let open = self.gate.open.read().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            return false;
        }
        self.tx
            .send(Envelope {
                event,
                gate: self.gate.clone(),
            })
            .is_ok()
    }

    /// Closes the gate, waiting for any delivery in progress to finish.
    pub fn close(&self) {
        let mut open = self.gate.open.write().unwrap_or_else(PoisonError::into_inner);
        *open = false;
    }

    pub fn is_closed(&self) -> bool {
        !*self.gate.open.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A queued event together with the gate of the sink that sent it.
#[derive(Debug)]
pub struct Envelope {
    event: DiscoveryEvent,
    gate: Arc<Gate>,
}

impl Envelope {
    pub fn event(&self) -> &DiscoveryEvent {
        &self.event
    }

    /// Runs `apply` while holding the gate open. Returns `None` when the
    /// sending side was closed in the meantime.
    pub fn deliver<F>(self, apply: F) -> Option<bool>
    where
        F: FnOnce(&DiscoveryEvent) -> bool,
    {
        let open = self.gate.open.read().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            return None;
        }
        Some(apply(&self.event))
    }
}

/// Multi-producer, single-consumer event queue.
pub struct EventBus {
    tx: mpsc::UnboundedSender<Envelope>,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// A fresh sink with its own gate.
    pub fn sink(&self) -> EventSink {
        EventSink {
            tx: self.tx.clone(),
            gate: Arc::new(Gate::new()),
        }
    }

    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
