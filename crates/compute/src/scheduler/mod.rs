//! Dirty-node compute scheduler with admission control and execution timeouts.
//!
//! Compute-feed links report queue-depth changes of fireable nodes through
//! [`ComputeScheduler::notify_queue_size_change`]. Nodes with queued work are
//! held in a [`DirtyQueue`] ordered by [`DirtyWorkItem`] weight. A single
//! control loop takes the next dirty node, drains its queue and submits each
//! action to a bounded [`ExecutionPool`], cancelling anything that overruns
//! the execution timeout.

pub mod dirty;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod runner;
pub mod types;

pub use dirty::DirtyQueue;
pub use error::ComputeError;
pub use metrics::SchedulerMetrics;
pub use pool::ExecutionPool;
pub use runner::ComputeScheduler;
pub use types::{dirty_weight, DirtyWorkItem};
