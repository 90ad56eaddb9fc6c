use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use ripple_core::sync::lock;
use ripple_core::NodeId;
use tokio::sync::Notify;

use super::types::DirtyWorkItem;

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<Reverse<DirtyWorkItem>>,
    next_seq: u64,
}

/// Thread-safe min-heap of dirty nodes with an async blocking `take`.
#[derive(Default)]
pub struct DirtyQueue {
    inner: Mutex<Inner>,
    available: Notify,
}

impl DirtyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, node_id: NodeId, weight: i64) {
        {
            let mut inner = lock(&self.inner);
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.heap.push(Reverse(DirtyWorkItem { node_id, weight, seq }));
        }
        self.available.notify_one();
    }

    /// Push unless the node already has an entry. Returns whether it was pushed.
    pub fn push_if_absent(&self, node_id: NodeId, weight: i64) -> bool {
        {
            let mut inner = lock(&self.inner);
            if inner.heap.iter().any(|Reverse(item)| item.node_id == node_id) {
                return false;
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.heap.push(Reverse(DirtyWorkItem { node_id, weight, seq }));
        }
        self.available.notify_one();
        true
    }

    pub fn poll(&self) -> Option<DirtyWorkItem> {
        lock(&self.inner).heap.pop().map(|Reverse(item)| item)
    }

    /// Wait for the lowest-weight item.
    pub async fn take(&self) -> DirtyWorkItem {
        loop {
            if let Some(item) = self.poll() {
                return item;
            }
            self.available.notified().await;
        }
    }

    /// Drop every entry for `node_id`. Returns how many were removed.
    pub fn remove_node(&self, node_id: NodeId) -> usize {
        let mut inner = lock(&self.inner);
        let before = inner.heap.len();
        inner.heap.retain(|Reverse(item)| item.node_id != node_id);
        before - inner.heap.len()
    }

    pub fn contains_node(&self, node_id: NodeId) -> bool {
        lock(&self.inner)
            .heap
            .iter()
            .any(|Reverse(item)| item.node_id == node_id)
    }

    pub fn clear(&self) {
        lock(&self.inner).heap.clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).heap.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).heap.is_empty()
    }
}
