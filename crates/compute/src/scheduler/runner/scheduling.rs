use std::sync::Arc;

use ripple_core::sync::write;
use ripple_core::{as_number, Value};
use ripple_queue::FireableNode;
use tracing::debug;

use crate::scheduler::types::dirty_weight;

use super::ComputeScheduler;

impl ComputeScheduler {
    /// Scheduling hint from a compute-feed link: `fireable`'s queue depth changed.
    ///
    /// A positive size for a node that is not yet dirty registers it and
    /// enqueues it with `round(edge_priority * priority_factor) + size`.
    /// Anything else, including a positive size for a node that is already
    /// dirty, clears the node from scheduling. The weight of a queued node is
    /// therefore never refreshed: a second positive report removes it.
    pub fn notify_queue_size_change(
        &self,
        fireable: &Arc<FireableNode>,
        label: &str,
        queue_size: &Value,
        edge_priority: i32,
    ) {
        let node_id = fireable.id();
        let size = as_number(queue_size).filter(|s| *s > 0.0);

        if let (true, Some(size)) = (self.is_active(), size) {
            let weight = dirty_weight(edge_priority, self.priority_factor(), size as i64);
            write(&self.served).insert(node_id, Arc::clone(fireable));
            if self.dirty.push_if_absent(node_id, weight) {
                debug!(node = %node_id, label, weight, "node marked dirty");
                return;
            }
        }

        let removed = self.dirty.remove_node(node_id);
        write(&self.served).remove(&node_id);
        if removed > 0 {
            debug!(node = %node_id, label, size = ?queue_size, "node cleared from scheduling");
        }
    }
}
