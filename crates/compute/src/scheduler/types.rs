use std::cmp::Ordering;

use ripple_core::NodeId;
use serde::Serialize;

/// A fireable node with queued work, waiting to be drained.
///
/// Ordered ascending by `weight`: the scheduler serves the *smallest* weight
/// first. The weight grows with link priority and queue depth, so a deeper
/// queue or a higher link priority is served later. This inverse scale is
/// kept as observed; see DESIGN.md before changing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DirtyWorkItem {
    pub node_id: NodeId,
    pub weight: i64,
    /// Insertion sequence, breaks weight ties in arrival order.
    pub seq: u64,
}

impl Ord for DirtyWorkItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.weight
            .cmp(&other.weight)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for DirtyWorkItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `round(edge_priority * priority_factor) + queue_size`, saturating at the
/// `i64` bounds.
pub fn dirty_weight(edge_priority: i32, priority_factor: f64, queue_size: i64) -> i64 {
    // Float-to-int casts saturate; NaN maps to 0.
    let scaled = (edge_priority as f64 * priority_factor).round() as i64;
    scaled.saturating_add(queue_size)
}
