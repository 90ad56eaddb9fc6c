//! Assembles a topology into live nodes, links and loops.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use ripple_compute::ComputeScheduler;
use ripple_core::{NodeId, RippleConfig};
use ripple_graph::{GraphStore, Node, Timer};
use ripple_propagation::{Direction, LinkKind, LinkRegistry};
use ripple_queue::{ActionHandler, ActionPayload, CleanupGuard, FireableNode, FireableRegistry, FnHandler};
use tokio::task::JoinHandle;
use tracing::info;

use crate::topology::{LinkKindDef, Topology, WriteDef};

pub struct Worker {
    links: LinkRegistry,
    timer: Timer,
    scheduler: Option<Arc<ComputeScheduler>>,
    fireables: Vec<Arc<FireableNode>>,
    writes: Vec<WriteDef>,
    cleanup: Vec<CleanupGuard>,
    pending_writes: Vec<JoinHandle<()>>,
}

/// Handler that only logs what it was asked to do.
fn logging_handler(node: String) -> Arc<dyn ActionHandler> {
    FnHandler::new(move |source: NodeId, payload: ActionPayload| {
        match payload {
            ActionPayload::Event(event) => {
                info!(node = %node, source = %source, event = %event.kind, "event action executed")
            }
            ActionPayload::Property { label, value } => {
                info!(node = %node, source = %source, label = %label, value = %value, "property action executed")
            }
        }
        Ok(())
    })
}

impl Worker {
    pub fn build(topology: &Topology, config: &RippleConfig, timer: Timer) -> Result<Self> {
        let graph = Arc::new(GraphStore::new());
        let registry = Arc::new(FireableRegistry::new());

        for name in topology.node_names() {
            graph.create(&name)?;
        }
        for def in &topology.nodes {
            let node = node_named(&graph, &def.name)?;
            for (label, value) in &def.properties {
                node.set_property_silently(label, value.clone());
            }
        }

        let mut fireables = Vec::new();
        for def in &topology.fireables {
            let node = node_named(&graph, &def.node)?;
            let window = def
                .hysteresis_window_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.queue.hysteresis_window());
            let fireable = FireableNode::new(node, logging_handler(def.node.clone()), window);
            registry.register(Arc::clone(&fireable));
            fireables.push(fireable);
        }

        let scheduler = match &topology.scheduler {
            Some(def) => {
                let mut compute = config.compute.clone();
                if let Some(threads) = def.threads {
                    compute.threads = threads;
                }
                if let Some(ms) = def.execution_timeout_ms {
                    compute.execution_timeout_ms = ms;
                }
                if let Some(factor) = def.priority_factor {
                    compute.priority_factor = factor;
                }
                Some(ComputeScheduler::new(node_named(&graph, &def.node)?, compute))
            }
            None => None,
        };

        let links = LinkRegistry::new(graph, registry, timer.clone(), config.propagation.clone());
        for def in &topology.links {
            let from = node_named(links.graph(), &def.from)?.id();
            let to = node_named(links.graph(), &def.to)?.id();
            let kind = match def.kind {
                LinkKindDef::Direct => LinkKind::Direct { direction: Direction::From },
                LinkKindDef::DirectTo => LinkKind::Direct { direction: Direction::To },
                LinkKindDef::Fire => LinkKind::Fire,
                LinkKindDef::ComputeFeed => {
                    let scheduler = scheduler
                        .as_ref()
                        .ok_or_else(|| anyhow!("compute-feed link without a scheduler"))?;
                    LinkKind::ComputeFeed { scheduler: Arc::downgrade(scheduler) }
                }
            };
            links
                .connect(from, to, kind, def.properties.clone())
                .with_context(|| format!("failed to connect {} -> {}", def.from, def.to))?;
        }

        info!(
            nodes = links.graph().len(),
            fireables = fireables.len(),
            links = links.len(),
            scheduler = scheduler.is_some(),
            "topology built"
        );

        Ok(Self {
            links,
            timer,
            scheduler,
            fireables,
            writes: topology.writes.clone(),
            cleanup: Vec::new(),
            pending_writes: Vec::new(),
        })
    }

    /// Start the scheduler and cleanup loops, then schedule scripted writes.
    pub fn start(&mut self) -> Result<()> {
        if let Some(scheduler) = &self.scheduler {
            scheduler.start()?;
        }
        self.cleanup = self
            .fireables
            .iter()
            .filter(|f| f.is_hysteresis_enabled())
            .map(|f| f.spawn_cleanup(&self.timer))
            .collect();

        for write in &self.writes {
            let node = node_named(self.links.graph(), &write.node)?;
            let (label, value) = (write.property.clone(), write.value.clone());
            self.pending_writes.push(self.timer.schedule(
                Duration::from_millis(write.after_ms),
                move || node.set_property(&label, value),
            ));
        }
        info!(writes = self.pending_writes.len(), "worker started");
        Ok(())
    }

    pub fn shutdown(&mut self) {
        for handle in self.pending_writes.drain(..) {
            handle.abort();
        }
        self.cleanup.clear();
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown();
        }
        info!("worker stopped");
    }

    pub fn graph(&self) -> &Arc<GraphStore> {
        self.links.graph()
    }

    pub fn scheduler(&self) -> Option<&Arc<ComputeScheduler>> {
        self.scheduler.as_ref()
    }
}

fn node_named(graph: &GraphStore, name: &str) -> Result<Arc<Node>> {
    graph
        .find_by_name(name)
        .ok_or_else(|| anyhow!("node '{name}' is not defined"))
}
