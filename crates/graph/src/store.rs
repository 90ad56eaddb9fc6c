use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use ripple_core::sync::{read, write};
use ripple_core::NodeId;
use serde::Serialize;

use crate::error::GraphError;
use crate::node::Node;

#[derive(Debug, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub observer_count: usize,
}

/// In-memory node registry standing in for the host graph.
#[derive(Default)]
pub struct GraphStore {
    nodes: RwLock<HashMap<NodeId, Arc<Node>>>,
    name_index: RwLock<HashMap<String, NodeId>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Names must be unique.
    pub fn insert(&self, node: Arc<Node>) -> Result<NodeId, GraphError> {
        let mut names = write(&self.name_index);
        if names.contains_key(node.name()) {
            return Err(GraphError::DuplicateName(node.name().to_string()));
        }
        let id = node.id();
        names.insert(node.name().to_string(), id);
        write(&self.nodes).insert(id, node);
        Ok(id)
    }

    /// Create and register a node in one step.
    pub fn create(&self, name: &str) -> Result<Arc<Node>, GraphError> {
        let node = Node::new(name);
        self.insert(Arc::clone(&node))?;
        Ok(node)
    }

    pub fn node(&self, id: NodeId) -> Result<Arc<Node>, GraphError> {
        read(&self.nodes)
            .get(&id)
            .cloned()
            .ok_or(GraphError::NodeNotFound(id))
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<Node>> {
        let id = *read(&self.name_index).get(name)?;
        read(&self.nodes).get(&id).cloned()
    }

    pub fn remove(&self, id: NodeId) -> Option<Arc<Node>> {
        let node = write(&self.nodes).remove(&id)?;
        write(&self.name_index).remove(node.name());
        Some(node)
    }

    pub fn len(&self) -> usize {
        read(&self.nodes).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.nodes).is_empty()
    }

    pub fn stats(&self) -> GraphStats {
        let nodes = read(&self.nodes);
        GraphStats {
            node_count: nodes.len(),
            observer_count: nodes.values().map(|n| n.observer_count()).sum(),
        }
    }
}
