use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use ripple_compute::ComputeScheduler;
use ripple_core::sync::{read, write};
use ripple_core::{Event, LinkId, NodeId, Notification, PropagationConfig, Value, QUEUE_SIZE};
use ripple_graph::{GraphStore, Node, NodeObserver, Timer};
use ripple_queue::FireableRegistry;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::settings::LinkSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Observe the source, write the target.
    From,
    /// Observe the target, write the source.
    To,
}

#[derive(Clone)]
pub enum LinkKind {
    Direct { direction: Direction },
    Fire,
    ComputeFeed { scheduler: Weak<ComputeScheduler> },
}

impl LinkKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Direct { .. } => "direct",
            Self::Fire => "fire",
            Self::ComputeFeed { .. } => "compute-feed",
        }
    }
}

impl fmt::Debug for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { direction } => f.debug_struct("Direct").field("direction", direction).finish(),
            Self::Fire => f.write_str("Fire"),
            Self::ComputeFeed { scheduler } => f
                .debug_struct("ComputeFeed")
                .field("live", &(scheduler.strong_count() > 0))
                .finish(),
        }
    }
}

/// Shared by every link of a registry. Holds the graph and fireables weakly:
/// links live in node observer lists, and the graph owns the nodes.
pub(crate) struct PropagationContext {
    pub(crate) graph: Weak<GraphStore>,
    pub(crate) fireables: Weak<FireableRegistry>,
    pub(crate) timer: Timer,
    pub(crate) config: PropagationConfig,
}

/// A typed edge between two nodes, registered as an observer on one of them.
pub struct Link {
    id: LinkId,
    source: NodeId,
    target: NodeId,
    kind: LinkKind,
    properties: RwLock<HashMap<String, Value>>,
    context: Arc<PropagationContext>,
}

impl Link {
    pub(crate) fn new(
        source: NodeId,
        target: NodeId,
        kind: LinkKind,
        properties: HashMap<String, Value>,
        context: Arc<PropagationContext>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            source,
            target,
            kind,
            properties: RwLock::new(properties),
            context,
        })
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn kind(&self) -> &LinkKind {
        &self.kind
    }

    /// The endpoint this link observes.
    pub fn observed(&self) -> NodeId {
        match self.kind {
            LinkKind::Direct { direction: Direction::To } => self.target,
            _ => self.source,
        }
    }

    /// The endpoint a direct link writes to.
    fn written(&self) -> NodeId {
        match self.kind {
            LinkKind::Direct { direction: Direction::To } => self.source,
            _ => self.target,
        }
    }

    pub fn property(&self, key: &str) -> Option<Value> {
        read(&self.properties).get(key).cloned()
    }

    pub fn properties(&self) -> HashMap<String, Value> {
        read(&self.properties).clone()
    }

    /// Settings are re-read on every notification, so this takes effect
    /// for the next one.
    pub fn set_property(&self, key: &str, value: Value) {
        write(&self.properties).insert(key.to_string(), value);
    }

    pub fn remove_property(&self, key: &str) -> Option<Value> {
        write(&self.properties).remove(key)
    }

    pub fn settings(&self) -> LinkSettings {
        LinkSettings::resolve(&read(&self.properties), &self.context.config)
    }

    /// Current value the deadband compares against. Only direct links have
    /// one: the written endpoint's value under the (renamed) key.
    pub fn last_value(&self, label: &str, settings: &LinkSettings) -> Option<Value> {
        match self.kind {
            LinkKind::Direct { .. } => {
                let graph = self.context.graph.upgrade()?;
                let node = graph.node(self.written()).ok()?;
                node.property(settings.target_property.as_deref().unwrap_or(label))
            }
            LinkKind::Fire | LinkKind::ComputeFeed { .. } => None,
        }
    }

    fn dispatch<F>(&self, settings: &LinkSettings, forward: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match settings.delay {
            Some(delay) => {
                trace!(link = %self.id, delay_ms = delay.as_millis() as u64, "deferring forward");
                self.context.timer.schedule(delay, forward);
            }
            None => forward(),
        }
    }

    fn on_event(&self, node: &Node, event: &Event, settings: &LinkSettings) {
        if !settings.event_gate_open() {
            trace!(link = %self.id, kind = %event.kind, "event gate closed");
            return;
        }
        // Events only travel over fire links.
        if !matches!(self.kind, LinkKind::Fire) {
            return;
        }
        let fireables = self.context.fireables.clone();
        let (source, target, priority) = (node.id(), self.target, settings.priority);
        let event = event.clone();
        self.dispatch(settings, move || {
            let Some(fireable) = fireables.upgrade().and_then(|r| r.get(target)) else {
                debug!(node = %target, "fire target has no fireable role, event dropped");
                return;
            };
            fireable.fire_event(source, event, priority);
        });
    }

    fn on_property(&self, node: &Node, label: &str, value: &Value, settings: &LinkSettings) {
        if !settings.property_gate_open() {
            trace!(link = %self.id, label, "property gate closed");
            return;
        }
        if !settings.monitors(label) {
            trace!(link = %self.id, label, "property not monitored");
            return;
        }
        if matches!(self.kind, LinkKind::ComputeFeed { .. }) && label != QUEUE_SIZE {
            return;
        }
        let last = self.last_value(label, settings);
        if !settings.deadband_passes(value, last.as_ref()) {
            trace!(link = %self.id, label, value = %value, "change within deadband");
            return;
        }

        let value = value.clone();
        let label = label.to_string();
        let priority = settings.priority;
        match &self.kind {
            LinkKind::Direct { .. } => {
                let graph = self.context.graph.clone();
                let written = self.written();
                let key = settings.target_property.clone().unwrap_or_else(|| label.clone());
                self.dispatch(settings, move || {
                    let Some(graph) = graph.upgrade() else { return };
                    match graph.node(written) {
                        Ok(node) => node.set_property(&key, value),
                        Err(e) => warn!(error = %e, "direct link endpoint vanished"),
                    }
                });
            }
            LinkKind::Fire => {
                let fireables = self.context.fireables.clone();
                let (source, target) = (node.id(), self.target);
                self.dispatch(settings, move || {
                    let Some(fireable) = fireables.upgrade().and_then(|r| r.get(target)) else {
                        debug!(node = %target, "fire target has no fireable role, property dropped");
                        return;
                    };
                    fireable.fire_property(source, &label, value, priority);
                });
            }
            LinkKind::ComputeFeed { scheduler } => {
                let scheduler = scheduler.clone();
                let fireables = self.context.fireables.clone();
                let source = node.id();
                self.dispatch(settings, move || {
                    let Some(scheduler) = scheduler.upgrade() else { return };
                    let Some(fireable) = fireables.upgrade().and_then(|r| r.get(source)) else {
                        debug!(node = %source, "compute-feed source has no fireable role");
                        return;
                    };
                    scheduler.notify_queue_size_change(&fireable, &label, &value, priority);
                });
            }
        }
    }
}

impl NodeObserver for Link {
    fn observer_id(&self) -> Uuid {
        self.id
    }

    fn notify(&self, node: &Node, notification: &Notification) {
        let settings = self.settings();
        match notification {
            Notification::Event(event) => self.on_event(node, event, &settings),
            Notification::Property { label, value } => self.on_property(node, label, value, &settings),
            Notification::Attribute { .. } => {}
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("target", &self.target)
            .field("kind", &self.kind)
            .finish()
    }
}
