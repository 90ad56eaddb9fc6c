//! Prioritised pending-action queues for fireable nodes.
//!
//! A [`FireableNode`] owns a [`HysteresisQueue`] of [`PendingAction`]s. Links
//! offer actions onto it; a compute scheduler drains it. Every offer, poll and
//! take republishes the queue depth as the node's `queue-size` property.

pub mod action;
pub mod error;
pub mod fireable;
pub mod hysteresis;

pub use action::{ActionHandler, ActionIdentity, ActionPayload, ActionTask, FnHandler, PendingAction};
pub use error::QueueError;
pub use fireable::{CleanupGuard, FireableNode, FireableRegistry};
pub use hysteresis::HysteresisQueue;
