//! Priority queue with time-windowed coalescing of duplicate actions.
//!
//! While the hysteresis window is non-zero, an action whose
//! [`ActionIdentity`] was accepted less than one window ago is rejected.
//! Accepted identities are remembered until a [`clean_up`] evicts them; the
//! sweep runs opportunistically on every offer, poll and take.
//!
//! [`clean_up`]: HysteresisQueue::clean_up

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ripple_core::sync::lock;
use tokio::sync::Notify;
use tracing::debug;

use crate::action::{ActionIdentity, PendingAction};

struct Entry {
    priority: i32,
    seq: u64,
    action: PendingAction,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Max-heap: higher priority first, then earlier insertion.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    /// Identity -> time it was last accepted.
    recent: HashMap<ActionIdentity, DateTime<Utc>>,
}

pub struct HysteresisQueue {
    inner: Mutex<Inner>,
    window_ms: AtomicU64,
    available: Notify,
}

impl HysteresisQueue {
    pub fn new(window: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            window_ms: AtomicU64::new(window.as_millis() as u64),
            available: Notify::new(),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms.load(AtomicOrdering::Relaxed))
    }

    /// Change the window. Setting it to zero disables coalescing and drops
    /// every remembered identity.
    pub fn set_window(&self, window: Duration) {
        self.window_ms
            .store(window.as_millis() as u64, AtomicOrdering::Relaxed);
        if window.is_zero() {
            lock(&self.inner).recent.clear();
        }
    }

    pub fn is_hysteresis_enabled(&self) -> bool {
        self.window_ms.load(AtomicOrdering::Relaxed) > 0
    }

    pub fn offer(&self, action: PendingAction) -> bool {
        self.offer_at(action, Utc::now())
    }

    /// Enqueue unless an identical action was accepted within the window.
    pub fn offer_at(&self, action: PendingAction, now: DateTime<Utc>) -> bool {
        let window = self.window();
        {
            let mut inner = lock(&self.inner);
            if !window.is_zero() {
                Self::evict_expired(&mut inner, window, now);
                let identity = action.identity();
                if inner.recent.contains_key(&identity) {
                    debug!(identity = ?identity, "coalesced duplicate action");
                    return false;
                }
                inner.recent.insert(identity, now);
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.heap.push(Entry {
                priority: action.priority,
                seq,
                action,
            });
        }
        self.available.notify_one();
        true
    }

    /// Highest-priority action, if any. Never blocks.
    pub fn poll(&self) -> Option<PendingAction> {
        self.poll_at(Utc::now())
    }

    pub fn poll_at(&self, now: DateTime<Utc>) -> Option<PendingAction> {
        let window = self.window();
        let mut inner = lock(&self.inner);
        if !window.is_zero() {
            Self::evict_expired(&mut inner, window, now);
        }
        inner.heap.pop().map(|entry| entry.action)
    }

    /// Wait until an action is available.
    pub async fn take(&self) -> PendingAction {
        loop {
            if let Some(action) = self.poll() {
                return action;
            }
            self.available.notified().await;
        }
    }

    /// Evict coalescing records older than the window. Returns how many went.
    pub fn clean_up(&self) -> usize {
        self.clean_up_at(Utc::now())
    }

    pub fn clean_up_at(&self, now: DateTime<Utc>) -> usize {
        let window = self.window();
        if window.is_zero() {
            return 0;
        }
        Self::evict_expired(&mut lock(&self.inner), window, now)
    }

    fn evict_expired(inner: &mut Inner, window: Duration, now: DateTime<Utc>) -> usize {
        let window = chrono::Duration::milliseconds(window.as_millis() as i64);
        let before = inner.recent.len();
        inner
            .recent
            .retain(|_, accepted| now.signed_duration_since(*accepted) < window);
        before - inner.recent.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).heap.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).heap.is_empty()
    }

    /// Number of identities currently inside their coalescing window.
    pub fn tracked_identities(&self) -> usize {
        lock(&self.inner).recent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::FnHandler;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    fn action(source: Uuid, label: &str, priority: i32) -> PendingAction {
        PendingAction::property(source, label, json!(1), priority, FnHandler::new(|_, _| Ok(())))
    }

    #[test]
    fn highest_priority_first() {
        let queue = HysteresisQueue::new(Duration::ZERO);
        let source = Uuid::new_v4();
        queue.offer(action(source, "a", 1));
        queue.offer(action(source, "b", 9));
        queue.offer(action(source, "c", 5));
        queue.offer(action(source, "d", -3));

        let order: Vec<i32> = std::iter::from_fn(|| queue.poll()).map(|a| a.priority).collect();
        assert_eq!(order, vec![9, 5, 1, -3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn disabled_hysteresis_keeps_duplicates() {
        let queue = HysteresisQueue::new(Duration::ZERO);
        let source = Uuid::new_v4();
        assert!(queue.offer(action(source, "x", 5)));
        assert!(queue.offer(action(source, "x", 5)));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.tracked_identities(), 0);
        assert!(!queue.is_hysteresis_enabled());
    }

    #[test]
    fn duplicates_coalesce_inside_window() {
        let queue = HysteresisQueue::new(Duration::from_millis(1000));
        let source = Uuid::new_v4();
        let t0 = Utc::now();

        assert!(queue.offer_at(action(source, "x", 5), t0));
        assert!(!queue.offer_at(action(source, "x", 5), t0 + ChronoDuration::milliseconds(500)));
        assert_eq!(queue.len(), 1);

        assert!(queue.offer_at(action(source, "x", 5), t0 + ChronoDuration::milliseconds(1500)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn distinct_identities_do_not_coalesce() {
        let queue = HysteresisQueue::new(Duration::from_millis(1000));
        let t0 = Utc::now();
        assert!(queue.offer_at(action(Uuid::new_v4(), "x", 5), t0));
        assert!(queue.offer_at(action(Uuid::new_v4(), "x", 5), t0));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn clean_up_evicts_only_expired_records() {
        let queue = HysteresisQueue::new(Duration::from_millis(1000));
        let source = Uuid::new_v4();
        let t0 = Utc::now();
        queue.offer_at(action(source, "old", 5), t0);
        queue.offer_at(action(source, "new", 5), t0 + ChronoDuration::milliseconds(800));

        assert_eq!(queue.clean_up_at(t0 + ChronoDuration::milliseconds(1200)), 1);
        assert_eq!(queue.tracked_identities(), 1);
        // Cleanup never touches queued actions.
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn poll_sweeps_records() {
        let queue = HysteresisQueue::new(Duration::from_millis(100));
        let source = Uuid::new_v4();
        let t0 = Utc::now();
        queue.offer_at(action(source, "x", 5), t0);
        assert!(queue.poll_at(t0 + ChronoDuration::milliseconds(200)).is_some());
        assert_eq!(queue.tracked_identities(), 0);
    }

    #[test]
    fn disabling_window_forgets_identities() {
        let queue = HysteresisQueue::new(Duration::from_millis(1000));
        let source = Uuid::new_v4();
        queue.offer(action(source, "x", 5));
        queue.set_window(Duration::ZERO);
        assert_eq!(queue.tracked_identities(), 0);
        assert!(queue.offer(action(source, "x", 5)));
    }

    #[tokio::test]
    async fn take_waits_for_offer() {
        let queue = Arc::new(HysteresisQueue::new(Duration::ZERO));
        let producer = Arc::clone(&queue);
        let source = Uuid::new_v4();

        let waiter = tokio::spawn(async move { queue.take().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        producer.offer(action(source, "late", 7));
        let taken = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("take should wake")
            .unwrap();
        assert_eq!(taken.priority, 7);
    }

    #[test]
    fn concurrent_offers_keep_priority_order() {
        let queue = Arc::new(HysteresisQueue::new(Duration::ZERO));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    let source = Uuid::new_v4();
                    for i in 0..50 {
                        queue.offer(action(source, &format!("p{t}-{i}"), (i * 7 + t) % 13));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let drained: Vec<i32> = std::iter::from_fn(|| queue.poll()).map(|a| a.priority).collect();
        assert_eq!(drained.len(), 200);
        assert!(drained.windows(2).all(|w| w[0] >= w[1]));
    }
}
