use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use ripple_core::config::HYSTERESIS_CLEANUP_INTERVAL;
use ripple_core::sync::{read, write};
use ripple_core::{Event, NodeId, Value, QUEUE_SIZE};
use ripple_graph::{Node, Timer};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::action::{ActionHandler, PendingAction};
use crate::hysteresis::HysteresisQueue;

/// Fireable role: a node that accepts prioritised actions for later execution.
pub struct FireableNode {
    node: Arc<Node>,
    queue: HysteresisQueue,
    handler: Arc<dyn ActionHandler>,
}

impl FireableNode {
    pub fn new(node: Arc<Node>, handler: Arc<dyn ActionHandler>, hysteresis_window: Duration) -> Arc<Self> {
        node.set_property_silently(QUEUE_SIZE, Value::from(0));
        Arc::new(Self {
            node,
            queue: HysteresisQueue::new(hysteresis_window),
            handler,
        })
    }

    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn fire_event(&self, source: NodeId, event: Event, priority: i32) -> bool {
        let action = PendingAction::event(source, event, priority, Arc::clone(&self.handler));
        self.offer(action)
    }

    pub fn fire_property(&self, source: NodeId, label: &str, value: Value, priority: i32) -> bool {
        let action = PendingAction::property(source, label, value, priority, Arc::clone(&self.handler));
        self.offer(action)
    }

    pub fn offer(&self, action: PendingAction) -> bool {
        let accepted = self.queue.offer(action);
        trace!(node = %self.id(), accepted, "offer");
        self.publish_depth();
        accepted
    }

    pub fn poll(&self) -> Option<PendingAction> {
        self.queue.clean_up();
        let action = self.queue.poll();
        self.publish_depth();
        action
    }

    pub async fn take(&self) -> PendingAction {
        self.queue.clean_up();
        let action = self.queue.take().await;
        self.publish_depth();
        action
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_hysteresis_enabled(&self) -> bool {
        self.queue.is_hysteresis_enabled()
    }

    pub fn set_hysteresis_window(&self, window: Duration) {
        self.queue.set_window(window);
    }

    pub fn queue(&self) -> &HysteresisQueue {
        &self.queue
    }

    /// Start the periodic cleanup sweep. It stops when the guard is dropped.
    pub fn spawn_cleanup(self: &Arc<Self>, timer: &Timer) -> CleanupGuard {
        self.spawn_cleanup_every(timer, HYSTERESIS_CLEANUP_INTERVAL)
    }

    pub(crate) fn spawn_cleanup_every(self: &Arc<Self>, timer: &Timer, every: Duration) -> CleanupGuard {
        let fireable = Arc::downgrade(self);
        let handle = timer.handle().spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(owner) = fireable.upgrade() else { break };
                if owner.is_hysteresis_enabled() {
                    let evicted = owner.queue.clean_up_at(Utc::now());
                    if evicted > 0 {
                        debug!(node = %owner.id(), evicted, "hysteresis cleanup");
                    }
                }
            }
        });
        CleanupGuard { handle }
    }

    fn publish_depth(&self) {
        self.node.set_property(QUEUE_SIZE, Value::from(self.queue.len()));
    }
}

/// Aborts a fireable node's cleanup loop on drop.
pub struct CleanupGuard {
    handle: JoinHandle<()>,
}

impl CleanupGuard {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Lookup of the fireable role by node id.
#[derive(Default)]
pub struct FireableRegistry {
    fireables: RwLock<HashMap<NodeId, Arc<FireableNode>>>,
}

impl FireableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, fireable: Arc<FireableNode>) {
        write(&self.fireables).insert(fireable.id(), fireable);
    }

    pub fn get(&self, id: NodeId) -> Option<Arc<FireableNode>> {
        read(&self.fireables).get(&id).cloned()
    }

    pub fn remove(&self, id: NodeId) -> Option<Arc<FireableNode>> {
        write(&self.fireables).remove(&id)
    }

    pub fn len(&self) -> usize {
        read(&self.fireables).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.fireables).is_empty()
    }
}
