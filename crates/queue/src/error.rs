//! Queue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("action handler failed: {0}")]
    Handler(String),

    #[error("target node {0} is not fireable")]
    NotFireable(uuid::Uuid),
}
