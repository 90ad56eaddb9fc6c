use ripple_core::NodeId;
use ripple_graph::GraphError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PropagationError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Node {0} has no fireable role")]
    NotFireable(NodeId),

    #[error("Compute scheduler for compute-feed link is gone")]
    SchedulerGone,
}
