use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use ripple_core::sync::{read, write};
use ripple_core::{Event, NodeId, Notification, Value};
use tracing::trace;
use uuid::Uuid;

/// Receives every attribute, property and event notification of a node.
///
/// Observers are called synchronously on the writing thread, after the
/// node's own locks have been released, so they may read or write the
/// node (or others) freely.
pub trait NodeObserver: Send + Sync {
    /// Stable identity used by [`Node::remove_observer`].
    fn observer_id(&self) -> Uuid;

    fn notify(&self, node: &Node, notification: &Notification);
}

/// A graph node: identity, property map and observer list.
///
/// Behaviour roles (fireable queue, compute scheduler, rule) are attached by
/// holding an `Arc<Node>`; the node itself knows nothing about them.
pub struct Node {
    id: NodeId,
    name: String,
    created_at: DateTime<Utc>,
    properties: RwLock<HashMap<String, Value>>,
    attributes: RwLock<HashMap<String, Value>>,
    observers: RwLock<Vec<Arc<dyn NodeObserver>>>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_id(Uuid::new_v4(), name)
    }

    pub fn with_id(id: NodeId, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.into(),
            created_at: Utc::now(),
            properties: RwLock::new(HashMap::new()),
            attributes: RwLock::new(HashMap::new()),
            observers: RwLock::new(Vec::new()),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn property(&self, label: &str) -> Option<Value> {
        read(&self.properties).get(label).cloned()
    }

    /// Snapshot of the whole property map.
    pub fn properties(&self) -> HashMap<String, Value> {
        read(&self.properties).clone()
    }

    pub fn has_property(&self, label: &str) -> bool {
        read(&self.properties).contains_key(label)
    }

    /// Write a property and notify every observer, even if the value is unchanged.
    pub fn set_property(&self, label: &str, value: Value) {
        write(&self.properties).insert(label.to_string(), value.clone());
        self.dispatch(&Notification::Property {
            label: label.to_string(),
            value,
        });
    }

    /// Write a property without notifying observers.
    pub fn set_property_silently(&self, label: &str, value: Value) {
        write(&self.properties).insert(label.to_string(), value);
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        read(&self.attributes).get(name).cloned()
    }

    pub fn set_attribute(&self, name: &str, value: Value) {
        write(&self.attributes).insert(name.to_string(), value.clone());
        self.dispatch(&Notification::Attribute {
            name: name.to_string(),
            value,
        });
    }

    pub fn emit_event(&self, event: Event) {
        self.dispatch(&Notification::Event(event));
    }

    pub fn add_observer(&self, observer: Arc<dyn NodeObserver>) {
        write(&self.observers).push(observer);
    }

    /// Returns whether an observer with this id was registered.
    pub fn remove_observer(&self, observer_id: Uuid) -> bool {
        let mut observers = write(&self.observers);
        let before = observers.len();
        observers.retain(|o| o.observer_id() != observer_id);
        observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        read(&self.observers).len()
    }

    fn dispatch(&self, notification: &Notification) {
        // Snapshot so observers can register/unregister while being notified.
        let observers: Vec<Arc<dyn NodeObserver>> = read(&self.observers).clone();
        trace!(node = %self.id, label = notification.label(), observers = observers.len(), "dispatch");
        for observer in observers {
            observer.notify(self, notification);
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("properties", &*read(&self.properties))
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// Closure-backed observer.
pub struct FnObserver<F> {
    id: Uuid,
    f: F,
}

impl<F> FnObserver<F>
where
    F: Fn(&Node, &Notification) + Send + Sync + 'static,
{
    pub fn new(f: F) -> Arc<Self> {
        Arc::new(Self { id: Uuid::new_v4(), f })
    }
}

impl<F> NodeObserver for FnObserver<F>
where
    F: Fn(&Node, &Notification) + Send + Sync + 'static,
{
    fn observer_id(&self) -> Uuid {
        self.id
    }

    fn notify(&self, node: &Node, notification: &Notification) {
        (self.f)(node, notification)
    }
}
