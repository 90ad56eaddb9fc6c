use ripple_core::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Duplicate node name: {0}")]
    DuplicateName(String),

    #[error("No tokio runtime available for timer")]
    NoRuntime,
}
