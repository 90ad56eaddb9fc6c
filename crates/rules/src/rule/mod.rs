//! Condition/action rules with fact memory and a refractory period.
//!
//! A rule watches any number of nodes. Every attribute, property or event
//! notification from a watched node becomes a [`CachedFact`] and may mark the
//! rule dirty; the [`RuleDispatcher`](crate::RuleDispatcher) then runs it.

mod evaluation;

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ripple_core::sync::{read, write};
use ripple_core::{
    as_int, NodeId, Notification, RulesConfig, Value, ACTION, CONDITION, DEBUG_LEVEL, FACT_COUNT,
};
use ripple_graph::{FnObserver, Node, NodeObserver};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::expression::{CompiledExpr, ExpressionEngine, RuleInfo};
use crate::fact::{CachedFact, Fact, FactMemory};
use crate::listener::RuleListener;

pub const MIN_PRIORITY: i32 = 1;
pub const MAX_PRIORITY: i32 = 10;
pub const DEFAULT_RULE_PRIORITY: i32 = 5;

/// Event kind emitted on the rule's node when its action ran.
pub const RULE_FIRED: &str = "rule-fired";

/// Out-of-range priorities fall back to the default rather than the bound.
pub fn clamp_priority(priority: i32) -> i32 {
    if (MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        priority
    } else {
        DEFAULT_RULE_PRIORITY
    }
}

/// Construction parameters of a [`Rule`].
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSpec {
    pub condition: String,
    pub action: String,
    pub priority: i32,
    /// Allow new runs while one is still in flight.
    pub parallel: bool,
    pub refractory: Duration,
    pub execution_timeout: Duration,
    /// Sleep before evaluating the condition.
    pub evaluation_delay: Duration,
    /// Sleep between a true condition and the action.
    pub execution_delay: Duration,
    pub fact_valid_delay: Duration,
    pub fact_valid_for: Duration,
    pub clear_facts_after_execution: bool,
    pub debug_level: i64,
}

impl RuleSpec {
    pub fn new(condition: impl Into<String>, action: impl Into<String>, config: &RulesConfig) -> Self {
        Self {
            condition: condition.into(),
            action: action.into(),
            priority: DEFAULT_RULE_PRIORITY,
            parallel: false,
            refractory: config.refractory(),
            execution_timeout: config.execution_timeout(),
            evaluation_delay: Duration::ZERO,
            execution_delay: Duration::ZERO,
            fact_valid_delay: config.fact_valid_delay(),
            fact_valid_for: config.fact_valid_for(),
            clear_facts_after_execution: config.clear_facts_after_execution,
            debug_level: 0,
        }
    }
}

pub struct Rule {
    node: Arc<Node>,
    engine: Arc<dyn ExpressionEngine>,
    priority: i32,
    parallel: bool,
    refractory: Duration,
    execution_timeout: Duration,
    evaluation_delay: Duration,
    execution_delay: Duration,
    fact_valid_delay: Duration,
    fact_valid_for: Duration,
    clear_facts_after_execution: bool,
    condition: RwLock<Option<CompiledExpr>>,
    action: RwLock<Option<CompiledExpr>>,
    debug_level: AtomicI64,
    dirty: AtomicBool,
    running: AtomicUsize,
    last_run: RwLock<Option<DateTime<Utc>>>,
    facts: FactMemory,
    listeners: RwLock<Vec<Arc<dyn RuleListener>>>,
    /// Observer id used on every watched node.
    watch_id: Uuid,
    settings_observer: Uuid,
}

impl Rule {
    /// Compile both expressions, publish the knobs on `node` and start
    /// listening for knob writes. A failed compilation is logged and leaves
    /// that expression unset until it is rewritten.
    pub fn new(node: Arc<Node>, engine: Arc<dyn ExpressionEngine>, spec: RuleSpec) -> Arc<Self> {
        let priority = clamp_priority(spec.priority);
        if priority != spec.priority {
            warn!(rule = %node.name(), requested = spec.priority, priority, "rule priority out of range");
        }

        node.set_property_silently(CONDITION, Value::from(spec.condition.clone()));
        node.set_property_silently(ACTION, Value::from(spec.action.clone()));
        node.set_property_silently(DEBUG_LEVEL, Value::from(spec.debug_level));
        node.set_property_silently(FACT_COUNT, Value::from(0));

        let condition = compile(engine.as_ref(), node.name(), CONDITION, &spec.condition);
        let action = compile(engine.as_ref(), node.name(), ACTION, &spec.action);

        Arc::new_cyclic(|weak: &Weak<Rule>| {
            let weak = weak.clone();
            let observer = FnObserver::new(move |_node: &Node, n: &Notification| {
                if let (Some(rule), Notification::Property { label, value }) = (weak.upgrade(), n) {
                    rule.apply_setting(label, value);
                }
            });
            let settings_observer = observer.observer_id();
            node.add_observer(observer);

            Self {
                node,
                engine,
                priority,
                parallel: spec.parallel,
                refractory: spec.refractory,
                execution_timeout: spec.execution_timeout,
                evaluation_delay: spec.evaluation_delay,
                execution_delay: spec.execution_delay,
                fact_valid_delay: spec.fact_valid_delay,
                fact_valid_for: spec.fact_valid_for,
                clear_facts_after_execution: spec.clear_facts_after_execution,
                condition: RwLock::new(condition),
                action: RwLock::new(action),
                debug_level: AtomicI64::new(spec.debug_level),
                dirty: AtomicBool::new(false),
                running: AtomicUsize::new(0),
                last_run: RwLock::new(None),
                facts: FactMemory::new(),
                listeners: RwLock::new(Vec::new()),
                watch_id: Uuid::new_v4(),
                settings_observer,
            }
        })
    }

    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    pub fn name(&self) -> &str {
        self.node.name()
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn execution_timeout(&self) -> Duration {
        self.execution_timeout
    }

    pub fn debug_level(&self) -> i64 {
        self.debug_level.load(Ordering::Relaxed)
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        *read(&self.last_run)
    }

    pub fn info(&self) -> RuleInfo {
        RuleInfo {
            id: self.id(),
            name: self.name().to_string(),
            priority: self.priority,
            debug_level: self.debug_level(),
        }
    }

    pub fn condition_source(&self) -> Option<String> {
        read(&self.condition).as_ref().map(|c| c.source().to_string())
    }

    pub fn action_source(&self) -> Option<String> {
        read(&self.action).as_ref().map(|c| c.source().to_string())
    }

    pub(crate) fn condition(&self) -> Option<CompiledExpr> {
        read(&self.condition).clone()
    }

    pub(crate) fn action(&self) -> Option<CompiledExpr> {
        read(&self.action).clone()
    }

    // ── Knobs ─────────────────────────────────────────────────

    /// Writes the node property; the rule recompiles from the notification.
    pub fn set_condition(&self, source: &str) {
        self.node.set_property(CONDITION, Value::from(source));
    }

    pub fn set_action(&self, source: &str) {
        self.node.set_property(ACTION, Value::from(source));
    }

    pub fn set_debug_level(&self, level: i64) {
        self.node.set_property(DEBUG_LEVEL, Value::from(level));
    }

    fn apply_setting(&self, label: &str, value: &Value) {
        match label {
            CONDITION | ACTION => {
                let Some(source) = value.as_str() else {
                    warn!(rule = %self.name(), key = label, value = %value, "expression must be a string");
                    return;
                };
                let which: &'static str = if label == CONDITION { CONDITION } else { ACTION };
                let compiled = compile(self.engine.as_ref(), self.name(), which, source);
                let slot = if which == CONDITION { &self.condition } else { &self.action };
                *write(slot) = compiled;
                info!(rule = %self.name(), expression = which, "rule expression updated");
            }
            DEBUG_LEVEL => match as_int(value) {
                Some(level) => self.debug_level.store(level, Ordering::Relaxed),
                None => warn!(rule = %self.name(), value = %value, "invalid debug-level"),
            },
            _ => {}
        }
    }

    // ── Triggering ────────────────────────────────────────────

    /// Feed notifications from `node` into this rule.
    pub fn watch(self: &Arc<Self>, node: &Node) {
        node.add_observer(Arc::new(RuleWatch {
            id: self.watch_id,
            rule: Arc::downgrade(self),
        }));
        debug!(rule = %self.name(), node = %node.name(), "rule watching node");
    }

    pub fn unwatch(&self, node: &Node) -> bool {
        node.remove_observer(self.watch_id)
    }

    /// Record a notification as a fact, then re-check dirtiness.
    pub fn accept(&self, source: NodeId, notification: &Notification) {
        self.accept_at(source, notification, Utc::now());
    }

    pub fn accept_at(&self, source: NodeId, notification: &Notification, now: DateTime<Utc>) {
        self.facts.push(CachedFact::new(
            Fact::from_notification(notification),
            source,
            now,
            self.fact_valid_delay,
            self.fact_valid_for,
        ));
        self.publish_fact_count();
        self.change_state_at(now);
    }

    pub fn change_state(&self) -> bool {
        self.change_state_at(Utc::now())
    }

    /// Mark the rule dirty when it may run: parallel or idle, and outside
    /// the refractory period. Returns whether it is dirty now.
    pub fn change_state_at(&self, now: DateTime<Utc>) -> bool {
        let free = self.parallel || self.running() == 0;
        let rested = match self.last_run() {
            None => true,
            Some(last) => now.signed_duration_since(last).to_std().map_or(false, |d| d > self.refractory),
        };
        if free && rested {
            if !self.dirty.swap(true, Ordering::SeqCst) {
                debug!(rule = %self.name(), "rule marked dirty");
            }
        }
        self.is_dirty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Clear the dirty flag, returning whether it was set.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }

    // ── Facts and listeners ───────────────────────────────────

    /// Currently valid facts. Expired facts are evicted and reported to
    /// every listener's `on_fact_expired`.
    pub fn facts(&self) -> Vec<CachedFact> {
        self.facts_at(Utc::now())
    }

    pub fn facts_at(&self, now: DateTime<Utc>) -> Vec<CachedFact> {
        let listeners = self.listeners();
        let valid = self.facts.facts_at(now, |expired| {
            debug!(rule = %self.name(), fact = %expired.fact.name, "fact expired");
            for listener in &listeners {
                listener.on_fact_expired(self, expired);
            }
        });
        self.publish_fact_count();
        valid
    }

    pub fn fact_memory(&self) -> &FactMemory {
        &self.facts
    }

    pub fn add_listener(&self, listener: Arc<dyn RuleListener>) {
        write(&self.listeners).push(listener);
    }

    pub(crate) fn listeners(&self) -> Vec<Arc<dyn RuleListener>> {
        read(&self.listeners).clone()
    }

    pub(crate) fn publish_fact_count(&self) {
        // Silent: a rule watching its own node must not feed on this.
        self.node
            .set_property_silently(FACT_COUNT, Value::from(self.facts.len()));
    }
}

impl Drop for Rule {
    fn drop(&mut self) {
        self.node.remove_observer(self.settings_observer);
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name())
            .field("priority", &self.priority)
            .field("dirty", &self.is_dirty())
            .field("running", &self.running())
            .finish()
    }
}

fn compile(
    engine: &dyn ExpressionEngine,
    rule: &str,
    which: &'static str,
    source: &str,
) -> Option<CompiledExpr> {
    match engine.compile(source) {
        Ok(compiled) => Some(compiled),
        Err(e) => {
            error!(rule, expression = which, source, error = %e, "expression failed to compile");
            None
        }
    }
}

/// Observer registered on watched nodes. Holds the rule weakly so a
/// dropped rule leaves only an inert observer behind.
struct RuleWatch {
    id: Uuid,
    rule: Weak<Rule>,
}

impl NodeObserver for RuleWatch {
    fn observer_id(&self) -> Uuid {
        self.id
    }

    fn notify(&self, node: &Node, notification: &Notification) {
        if let Some(rule) = self.rule.upgrade() {
            rule.accept(node.id(), notification);
        }
    }
}
