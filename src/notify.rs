//! Deposit notifications
//!
//! The walker and the manager report progress through a [`Notifier`]. How
//! events are delivered (log, stream, mail) is up to the sink.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::{error, info, warn};

use crate::resource::{ResourceKind, ResourceNode};

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A resource was created (or, for descriptions, its URI became known)
    Deposit,
    /// A resource's links were rewritten to repository URIs
    Remap,
    /// The deposit failed and was rolled back
    Error,
    /// The deposit was committed
    Success,
    /// Liveness signal from a surrounding service; never emitted by the deposit core
    Heartbeat,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Deposit => "DEPOSIT",
            EventKind::Remap => "REMAP",
            EventKind::Error => "ERROR",
            EventKind::Success => "SUCCESS",
            EventKind::Heartbeat => "HEARTBEAT",
        }
    }
}

/// A single notification, borrowing from the in-flight deposit
#[derive(Debug, Clone)]
pub struct DepositEvent<'a> {
    pub kind: EventKind,
    pub uri: Option<&'a str>,
    pub node: Option<&'a ResourceNode>,
    pub detail: Option<String>,
}

impl<'a> DepositEvent<'a> {
    pub fn deposit(uri: &'a str, node: &'a ResourceNode) -> Self {
        Self {
            kind: EventKind::Deposit,
            uri: Some(uri),
            node: Some(node),
            detail: None,
        }
    }

    pub fn remap(uri: &'a str, node: &'a ResourceNode, detail: String) -> Self {
        Self {
            kind: EventKind::Remap,
            uri: Some(uri),
            node: Some(node),
            detail: Some(detail),
        }
    }

    pub fn error(detail: String) -> Self {
        Self {
            kind: EventKind::Error,
            uri: None,
            node: None,
            detail: Some(detail),
        }
    }

    pub fn success(uri: &'a str, detail: String) -> Self {
        Self {
            kind: EventKind::Success,
            uri: Some(uri),
            node: None,
            detail: Some(detail),
        }
    }

    pub fn to_record(&self) -> EventRecord {
        EventRecord {
            kind: self.kind,
            uri: self.uri.map(String::from),
            local_id: self.node.map(|n| n.local_id.clone()),
            resource_kind: self.node.map(ResourceNode::kind),
            detail: self.detail.clone(),
        }
    }
}

/// Owned, serializable form of an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_kind: Option<ResourceKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Sink for deposit events
pub trait Notifier {
    fn notify(&self, event: &DepositEvent<'_>);
}

/// Discards every event
pub struct NoOpNotifier;

impl Notifier for NoOpNotifier {
    fn notify(&self, _event: &DepositEvent<'_>) {}
}

/// Logs every event through `tracing`
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: &DepositEvent<'_>) {
        let uri = event.uri.unwrap_or("-");
        let local_id = event.node.map(|n| n.local_id.as_str()).unwrap_or("-");
        let detail = event.detail.as_deref().unwrap_or("");
        match event.kind {
            EventKind::Error => error!(kind = event.kind.as_str(), uri, local_id, "{}", detail),
            _ => info!(kind = event.kind.as_str(), uri, local_id, "{}", detail),
        }
    }
}

/// Writes one JSON object per line
pub struct JsonLinesNotifier<W: Write> {
    writer: Mutex<W>,
}

impl<W: Write> JsonLinesNotifier<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write> Notifier for JsonLinesNotifier<W> {
    fn notify(&self, event: &DepositEvent<'_>) {
        let line = match serde_json::to_string(&event.to_record()) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize {} event: {}", event.kind.as_str(), e);
                return;
            }
        };
        let mut writer = self.writer.lock();
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            warn!("Failed to write {} event: {}", event.kind.as_str(), e);
        }
    }
}

/// Keeps every event in memory
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<EventRecord>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: &DepositEvent<'_>) {
        self.events.lock().push(event.to_record());
    }
}

/// Forwards every event to several sinks in order
pub struct FanoutNotifier<'a> {
    sinks: Vec<&'a dyn Notifier>,
}

impl<'a> FanoutNotifier<'a> {
    pub fn new(sinks: Vec<&'a dyn Notifier>) -> Self {
        Self { sinks }
    }
}

impl Notifier for FanoutNotifier<'_> {
    fn notify(&self, event: &DepositEvent<'_>) {
        for sink in &self.sinks {
            sink.notify(event);
        }
    }
}
