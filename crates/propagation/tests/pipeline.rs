//! Sensor → fire link → fireable queue → compute-feed → scheduler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ripple_compute::ComputeScheduler;
use ripple_core::{ComputeConfig, Event, NodeId, PropagationConfig, Value};
use ripple_graph::{GraphStore, Timer};
use ripple_propagation::{LinkKind, LinkRegistry};
use ripple_queue::{ActionHandler, ActionPayload, FireableNode, FireableRegistry, FnHandler, QueueError};
use serde_json::json;

struct Harness {
    links: LinkRegistry,
}

impl Harness {
    fn new() -> Self {
        Self {
            links: LinkRegistry::new(
                Arc::new(GraphStore::new()),
                Arc::new(FireableRegistry::new()),
                Timer::current().unwrap(),
                PropagationConfig::default(),
            ),
        }
    }

    fn fireable(&self, name: &str, handler: Arc<dyn ActionHandler>, window: Duration) -> Arc<FireableNode> {
        let node = self.links.graph().create(name).unwrap();
        let fireable = FireableNode::new(node, handler, window);
        self.links.fireables().register(Arc::clone(&fireable));
        fireable
    }

    fn fire(&self, from: NodeId, to: NodeId, props: &[(&str, Value)]) {
        let props: HashMap<String, Value> = props.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        self.links.connect(from, to, LinkKind::Fire, props).unwrap();
    }
}

fn noop() -> Arc<dyn ActionHandler> {
    FnHandler::new(|_: NodeId, _: ActionPayload| Ok(()))
}

struct Sleeper {
    hold: Duration,
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl Sleeper {
    async fn run(&self) -> Result<(), QueueError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ActionHandler for Sleeper {
    async fn on_event(&self, _source: NodeId, _event: Event) -> Result<(), QueueError> {
        self.run().await
    }

    async fn on_property(&self, _source: NodeId, _label: String, _value: Value) -> Result<(), QueueError> {
        self.run().await
    }
}

async fn wait_until(limit: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn inactive_fire_link_enqueues_nothing() {
    let h = Harness::new();
    let sensor = h.links.graph().create("sensor").unwrap();
    let pump = h.fireable("pump", noop(), Duration::ZERO);
    h.fire(sensor.id(), pump.id(), &[("active", json!(false))]);

    sensor.set_property("temp", json!(40));
    sensor.emit_event(Event::new("alarm", sensor.id()));
    assert!(pump.is_empty());
    assert_eq!(pump.node().property("queue-size"), Some(json!(0)));
}

#[tokio::test]
async fn event_gate_is_independent_of_property_gate() {
    let h = Harness::new();
    let sensor = h.links.graph().create("sensor").unwrap();
    let pump = h.fireable("pump", noop(), Duration::ZERO);
    h.fire(sensor.id(), pump.id(), &[("active-event", json!("false"))]);

    sensor.emit_event(Event::new("alarm", sensor.id()));
    assert!(pump.is_empty());
    sensor.set_property("temp", json!(40));
    assert_eq!(pump.len(), 1);
    assert_eq!(pump.node().property("queue-size"), Some(json!(1)));
}

#[tokio::test]
async fn higher_link_priority_is_polled_first() {
    let h = Harness::new();
    let low = h.links.graph().create("low").unwrap();
    let high = h.links.graph().create("high").unwrap();
    let pump = h.fireable("pump", noop(), Duration::ZERO);
    h.fire(low.id(), pump.id(), &[("priority", json!(1))]);
    h.fire(high.id(), pump.id(), &[("Priority", json!("9"))]);

    low.set_property("temp", json!(1));
    high.set_property("temp", json!(2));

    let first = pump.poll().unwrap();
    assert_eq!(first.source, high.id());
    assert_eq!(first.priority, 9);
    assert_eq!(pump.poll().unwrap().source, low.id());
    assert!(pump.poll().is_none());
}

#[tokio::test]
async fn hysteresis_suppresses_repeats_within_window() {
    let h = Harness::new();
    let sensor = h.links.graph().create("sensor").unwrap();
    let pump = h.fireable("pump", noop(), Duration::from_millis(200));
    h.fire(sensor.id(), pump.id(), &[]);

    sensor.set_property("temp", json!(1));
    sensor.set_property("temp", json!(2));
    assert_eq!(pump.len(), 1);

    // A different label is a different identity.
    sensor.set_property("level", json!(2));
    assert_eq!(pump.len(), 2);

    tokio::time::sleep(Duration::from_millis(300)).await;
    sensor.set_property("temp", json!(3));
    assert_eq!(pump.len(), 3);
}

#[tokio::test]
async fn delayed_fire_link_enqueues_later() {
    let h = Harness::new();
    let sensor = h.links.graph().create("sensor").unwrap();
    let pump = h.fireable("pump", noop(), Duration::ZERO);
    h.fire(sensor.id(), pump.id(), &[("delay", json!(50))]);

    sensor.set_property("temp", json!(1));
    assert!(pump.is_empty());
    assert!(wait_until(Duration::from_secs(2), || pump.len() == 1).await);
}

#[tokio::test]
async fn scheduler_runs_fed_nodes_with_bounded_concurrency() {
    let h = Harness::new();
    let sensor = h.links.graph().create("sensor").unwrap();
    let compute_node = h.links.graph().create("compute").unwrap();
    let scheduler = ComputeScheduler::new(
        compute_node,
        ComputeConfig {
            threads: 2,
            execution_timeout_ms: 5_000,
            priority_factor: 1.0,
            admission_backoff_ms: 10,
        },
    );

    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let mut pumps = Vec::new();
    for name in ["a", "b", "c"] {
        let handler = Arc::new(Sleeper {
            hold: Duration::from_millis(100),
            current: Arc::clone(&current),
            peak: Arc::clone(&peak),
            completed: Arc::clone(&completed),
        });
        let pump = h.fireable(name, handler, Duration::ZERO);
        h.fire(sensor.id(), pump.id(), &[]);
        h.links
            .connect(
                pump.id(),
                scheduler.id(),
                LinkKind::ComputeFeed { scheduler: Arc::downgrade(&scheduler) },
                HashMap::new(),
            )
            .unwrap();
        pumps.push(pump);
    }

    scheduler.start().unwrap();
    sensor.set_property("temp", json!(70));

    assert!(wait_until(Duration::from_secs(3), || completed.load(Ordering::SeqCst) == 3).await);
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(pumps.iter().all(|p| p.is_empty()));
    assert_eq!(scheduler.metrics().timed_out, 0);

    scheduler.shutdown();
}

#[tokio::test]
async fn compute_feed_ignores_other_properties() {
    let h = Harness::new();
    let compute_node = h.links.graph().create("compute").unwrap();
    let scheduler = ComputeScheduler::new(compute_node, ComputeConfig::default());
    let pump = h.fireable("pump", noop(), Duration::ZERO);
    h.links
        .connect(
            pump.id(),
            scheduler.id(),
            LinkKind::ComputeFeed { scheduler: Arc::downgrade(&scheduler) },
            HashMap::new(),
        )
        .unwrap();
    scheduler.start().unwrap();

    pump.node().set_property("temp", json!(5));
    assert_eq!(scheduler.dirty_len(), 0);
    scheduler.shutdown();
}

async fn assert_gated_feed_never_dirties(gate: &str) {
    let h = Harness::new();
    let compute_node = h.links.graph().create("compute").unwrap();
    let scheduler = ComputeScheduler::new(compute_node, ComputeConfig::default());
    let pump = h.fireable("pump", noop(), Duration::ZERO);
    h.links
        .connect(
            pump.id(),
            scheduler.id(),
            LinkKind::ComputeFeed { scheduler: Arc::downgrade(&scheduler) },
            HashMap::from([(gate.to_string(), json!(false))]),
        )
        .unwrap();
    scheduler.start().unwrap();

    pump.fire_property(NodeId::new_v4(), "temp", json!(70), 5);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(scheduler.dirty_len(), 0);
    assert_eq!(scheduler.served_len(), 0);
    assert_eq!(scheduler.metrics().submitted, 0);
    assert_eq!(pump.len(), 1);
    scheduler.shutdown();
}

#[tokio::test]
async fn inactive_compute_feed_never_marks_dirty() {
    assert_gated_feed_never_dirties("active").await;
}

#[tokio::test]
async fn closed_property_gate_blocks_compute_feed() {
    assert_gated_feed_never_dirties("active-property").await;
}
