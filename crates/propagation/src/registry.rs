use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use ripple_core::sync::{read, write};
use ripple_core::{LinkId, NodeId, PropagationConfig, Value};
use ripple_graph::{GraphStore, NodeObserver, Timer};
use ripple_queue::FireableRegistry;
use tracing::{debug, info};

use crate::error::PropagationError;
use crate::link::{Link, LinkKind, PropagationContext};

/// Owns every link of a graph and keeps the observer lists in step.
pub struct LinkRegistry {
    graph: Arc<GraphStore>,
    fireables: Arc<FireableRegistry>,
    context: Arc<PropagationContext>,
    links: RwLock<HashMap<LinkId, Arc<Link>>>,
}

impl LinkRegistry {
    pub fn new(
        graph: Arc<GraphStore>,
        fireables: Arc<FireableRegistry>,
        timer: Timer,
        config: PropagationConfig,
    ) -> Self {
        let context = Arc::new(PropagationContext {
            graph: Arc::downgrade(&graph),
            fireables: Arc::downgrade(&fireables),
            timer,
            config,
        });
        Self {
            graph,
            fireables,
            context,
            links: RwLock::new(HashMap::new()),
        }
    }

    /// Create a link and attach it to its observed endpoint.
    ///
    /// A compute-feed link needs a live scheduler and a fireable source.
    pub fn connect(
        &self,
        source: NodeId,
        target: NodeId,
        kind: LinkKind,
        properties: HashMap<String, Value>,
    ) -> Result<Arc<Link>, PropagationError> {
        self.graph.node(source)?;
        self.graph.node(target)?;
        if let LinkKind::ComputeFeed { scheduler } = &kind {
            if scheduler.strong_count() == 0 {
                return Err(PropagationError::SchedulerGone);
            }
            if self.fireables.get(source).is_none() {
                return Err(PropagationError::NotFireable(source));
            }
        }

        let link = Link::new(source, target, kind, properties, Arc::clone(&self.context));
        let observed = self.graph.node(link.observed())?;
        observed.add_observer(Arc::clone(&link) as Arc<dyn NodeObserver>);
        write(&self.links).insert(link.id(), Arc::clone(&link));

        info!(
            link = %link.id(),
            kind = link.kind().name(),
            source = %source,
            target = %target,
            "link connected"
        );
        Ok(link)
    }

    /// Detach and drop a link. Forwards already deferred on the timer
    /// still run.
    pub fn disconnect(&self, id: LinkId) -> Option<Arc<Link>> {
        let link = write(&self.links).remove(&id)?;
        if let Ok(node) = self.graph.node(link.observed()) {
            node.remove_observer(id);
        }
        debug!(link = %id, "link disconnected");
        Some(link)
    }

    pub fn link(&self, id: LinkId) -> Option<Arc<Link>> {
        read(&self.links).get(&id).cloned()
    }

    /// Links whose source is `node`.
    pub fn links_from(&self, node: NodeId) -> Vec<Arc<Link>> {
        read(&self.links)
            .values()
            .filter(|link| link.source() == node)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        read(&self.links).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.links).is_empty()
    }

    pub fn graph(&self) -> &Arc<GraphStore> {
        &self.graph
    }

    pub fn fireables(&self) -> &Arc<FireableRegistry> {
        &self.fireables
    }
}
