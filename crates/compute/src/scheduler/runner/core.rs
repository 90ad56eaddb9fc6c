use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, Instant};

use ripple_core::sync::{lock, read, write};
use ripple_core::{
    as_int, as_number, ComputeConfig, NodeId, Notification, Value, EXECUTION_TIMEOUT_MS,
    IN_FLIGHT, PRIORITY_FACTOR, QUEUE_SIZE, THREAD_POOL_SIZE,
};
use ripple_graph::{FnObserver, Node, NodeObserver};
use ripple_queue::FireableNode;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::scheduler::dirty::DirtyQueue;
use crate::scheduler::error::ComputeError;
use crate::scheduler::metrics::SchedulerMetrics;
use crate::scheduler::pool::ExecutionPool;

/// An action handed to the execution pool and not yet swept.
pub(super) struct InFlight {
    pub(super) handle: JoinHandle<()>,
    pub(super) started: Instant,
    pub(super) description: String,
}

/// The compute scheduler. Drains dirty fireable nodes into a bounded
/// execution pool, lowest [`DirtyWorkItem`](crate::DirtyWorkItem) weight first.
///
/// Runtime knobs (`thread-pool-size`, `execution-timeout-ms`,
/// `priority-factor`) live as properties on the scheduler's own node and
/// take effect as soon as they are written.
pub struct ComputeScheduler {
    pub(super) node: Arc<Node>,
    pub(super) threads: AtomicUsize,
    pub(super) execution_timeout_ms: AtomicU64,
    /// `f64` bits.
    pub(super) priority_factor: AtomicU64,
    pub(super) admission_backoff: Duration,
    pub(super) active: AtomicBool,
    pub(super) dirty: DirtyQueue,
    /// Fireable nodes currently registered as dirty, by id.
    pub(super) served: RwLock<HashMap<NodeId, Arc<FireableNode>>>,
    pub(super) in_flight: Mutex<HashMap<Uuid, InFlight>>,
    pub(super) pool: ExecutionPool,
    pub(super) metrics: Arc<RwLock<SchedulerMetrics>>,
    pub(super) loop_handle: Mutex<Option<JoinHandle<()>>>,
    settings_observer: Uuid,
}

impl ComputeScheduler {
    /// Create a scheduler bound to `node`. Call [`start`](Self::start) to run it.
    pub fn new(node: Arc<Node>, config: ComputeConfig) -> Arc<Self> {
        let threads = config.resolved_threads().clamp(1, ExecutionPool::MAX_CAPACITY);
        let timeout_ms = config.execution_timeout_ms;
        let factor = config.priority_factor;

        node.set_property_silently(THREAD_POOL_SIZE, Value::from(threads));
        node.set_property_silently(EXECUTION_TIMEOUT_MS, Value::from(timeout_ms));
        node.set_property_silently(PRIORITY_FACTOR, Value::from(factor));
        node.set_property_silently(QUEUE_SIZE, Value::from(0));
        node.set_property_silently(IN_FLIGHT, Value::from(0));

        Arc::new_cyclic(|weak: &Weak<ComputeScheduler>| {
            let weak = weak.clone();
            let observer = FnObserver::new(move |_node: &Node, n: &Notification| {
                if let (Some(scheduler), Notification::Property { label, value }) = (weak.upgrade(), n) {
                    if let Err(e) = scheduler.apply_setting(label, value) {
                        warn!(error = %e, "ignored scheduler setting");
                    }
                }
            });
            let settings_observer = observer.observer_id();
            node.add_observer(observer);

            Self {
                node,
                threads: AtomicUsize::new(threads),
                execution_timeout_ms: AtomicU64::new(timeout_ms),
                priority_factor: AtomicU64::new(factor.to_bits()),
                admission_backoff: config.admission_backoff(),
                active: AtomicBool::new(false),
                dirty: DirtyQueue::new(),
                served: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                pool: ExecutionPool::new(threads),
                metrics: Arc::new(RwLock::new(SchedulerMetrics::default())),
                loop_handle: Mutex::new(None),
                settings_observer,
            }
        })
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn threads(&self) -> usize {
        self.threads.load(Ordering::SeqCst)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms.load(Ordering::SeqCst))
    }

    pub fn priority_factor(&self) -> f64 {
        f64::from_bits(self.priority_factor.load(Ordering::SeqCst))
    }

    /// Publish a new thread count; the node observer applies it.
    pub fn set_threads(&self, threads: usize) {
        self.node.set_property(THREAD_POOL_SIZE, Value::from(threads));
    }

    pub fn set_execution_timeout(&self, timeout: Duration) {
        self.node
            .set_property(EXECUTION_TIMEOUT_MS, Value::from(timeout.as_millis() as u64));
    }

    pub fn set_priority_factor(&self, factor: f64) {
        self.node.set_property(PRIORITY_FACTOR, Value::from(factor));
    }

    /// Apply a knob written on the scheduler node. Unrelated labels are ignored.
    pub(super) fn apply_setting(&self, label: &str, value: &Value) -> Result<(), ComputeError> {
        let invalid = || ComputeError::InvalidSetting {
            key: label.to_string(),
            value: value.to_string(),
        };
        match label {
            THREAD_POOL_SIZE => {
                let threads = as_int(value)
                    .and_then(|t| usize::try_from(t).ok())
                    .filter(|t| (1..=ExecutionPool::MAX_CAPACITY).contains(t))
                    .ok_or_else(invalid)?;
                let previous = self.threads.swap(threads, Ordering::SeqCst);
                if previous != threads {
                    self.pool.resize(threads);
                    info!(scheduler = %self.id(), previous, threads, "thread pool resized");
                }
            }
            EXECUTION_TIMEOUT_MS => {
                let ms = as_int(value).filter(|ms| *ms >= 0).ok_or_else(invalid)? as u64;
                self.execution_timeout_ms.store(ms, Ordering::SeqCst);
                info!(scheduler = %self.id(), timeout_ms = ms, "execution timeout changed");
            }
            PRIORITY_FACTOR => {
                let factor = as_number(value).filter(|f| f.is_finite()).ok_or_else(invalid)?;
                self.priority_factor.store(factor.to_bits(), Ordering::SeqCst);
                info!(scheduler = %self.id(), factor, "priority factor changed");
            }
            _ => {}
        }
        Ok(())
    }

    /// Actions submitted and not yet swept.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Actions currently holding an execution slot.
    pub fn running(&self) -> usize {
        self.pool.running()
    }

    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    pub fn served_len(&self) -> usize {
        read(&self.served).len()
    }

    pub fn is_served(&self, node_id: NodeId) -> bool {
        read(&self.served).contains_key(&node_id)
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        read(&self.metrics).clone()
    }

    pub(super) fn publish_counters(&self) {
        let in_flight = Value::from(self.in_flight());
        if self.node.property(IN_FLIGHT).as_ref() != Some(&in_flight) {
            self.node.set_property(IN_FLIGHT, in_flight);
        }
        let dirty = Value::from(self.dirty_len());
        if self.node.property(QUEUE_SIZE).as_ref() != Some(&dirty) {
            self.node.set_property(QUEUE_SIZE, dirty);
        }
    }

    pub(super) fn record_failure(metrics: &RwLock<SchedulerMetrics>) {
        write(metrics).failed += 1;
    }
}

impl Drop for ComputeScheduler {
    fn drop(&mut self) {
        self.node.remove_observer(self.settings_observer);
    }
}
