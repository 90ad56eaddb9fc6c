use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::Value;

pub type NodeId = Uuid;
pub type LinkId = Uuid;

/// Default severity carried by events that do not set one.
pub const DEFAULT_SEVERITY: u16 = 500;

/// A structured event emitted by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    /// Event type, e.g. `"rule-fired"`. Used for hysteresis identity.
    pub kind: String,
    pub message: String,
    pub severity: u16,
    pub source: NodeId,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub payload: Value,
}

impl Event {
    pub fn new(kind: impl Into<String>, source: NodeId) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            message: String::new(),
            severity: DEFAULT_SEVERITY,
            source,
            time: Utc::now(),
            payload: Value::Null,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_severity(mut self, severity: u16) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// A change observed on a node, delivered to its observers.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Node-level attribute update (display name, value attribute, ...).
    Attribute { name: String, value: Value },
    /// Property write.
    Property { label: String, value: Value },
    Event(Event),
}

impl Notification {
    pub fn label(&self) -> &str {
        match self {
            Notification::Attribute { name, .. } => name,
            Notification::Property { label, .. } => label,
            Notification::Event(event) => &event.kind,
        }
    }
}
