//! [`RuleDispatcher`]: drives dirty rules to evaluation.
//!
//! One control loop per dispatcher. Each tick submits every dirty rule
//! (highest priority first) as its own task with a deadline, then sweeps
//! in-flight runs: overdue ones are aborted, finished ones have their step
//! trace collected and logged.

mod execution;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use ripple_core::sync::{lock, read, write};
use ripple_core::{NodeId, RulesConfig};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::rule::Rule;
use crate::trace::StepTrace;

/// Dispatcher counters.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DispatchMetrics {
    pub submitted: u64,
    pub completed: u64,
    /// Runs whose task panicked.
    pub failed: u64,
    pub timed_out: u64,
    /// Finished runs whose trace was not collected within the bound.
    pub traces_dropped: u64,
}

pub(crate) struct RuleRun {
    pub(crate) rule: Arc<Rule>,
    pub(crate) handle: JoinHandle<StepTrace>,
    pub(crate) deadline: Instant,
}

pub struct RuleDispatcher {
    config: RulesConfig,
    rules: RwLock<HashMap<NodeId, Arc<Rule>>>,
    in_flight: Mutex<HashMap<Uuid, RuleRun>>,
    active: AtomicBool,
    metrics: RwLock<DispatchMetrics>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RuleDispatcher {
    pub fn new(config: RulesConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            rules: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            active: AtomicBool::new(false),
            metrics: RwLock::new(DispatchMetrics::default()),
            loop_handle: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &RulesConfig {
        &self.config
    }

    /// Register (or replace) a rule, keyed by its node id.
    pub fn register(&self, rule: Arc<Rule>) {
        info!(rule = %rule.name(), priority = rule.priority(), "rule registered");
        write(&self.rules).insert(rule.id(), rule);
    }

    /// Stop scheduling a rule. A run already in flight is left to finish.
    pub fn unregister(&self, id: NodeId) -> Option<Arc<Rule>> {
        let removed = write(&self.rules).remove(&id);
        if let Some(rule) = &removed {
            info!(rule = %rule.name(), "rule unregistered");
        }
        removed
    }

    pub fn rule(&self, id: NodeId) -> Option<Arc<Rule>> {
        read(&self.rules).get(&id).cloned()
    }

    pub fn rule_count(&self) -> usize {
        read(&self.rules).len()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    pub fn metrics(&self) -> DispatchMetrics {
        read(&self.metrics).clone()
    }
}
