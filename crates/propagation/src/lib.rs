//! Link-level propagation policies.
//!
//! A [`Link`] connects two nodes and observes one of them. On every
//! notification it resolves its string-keyed properties into
//! [`LinkSettings`], runs the gates in order (active, monitored property,
//! deadband), then forwards inline or after the configured delay:
//!
//! - `direct` writes the property onto the other endpoint, optionally renamed;
//! - `fire` enqueues a prioritised action on the target's fireable queue;
//! - `compute-feed` reports the source's queue depth to its compute scheduler.

pub mod error;
pub mod link;
pub mod registry;
pub mod settings;

pub use error::PropagationError;
pub use link::{Direction, Link, LinkKind};
pub use registry::LinkRegistry;
pub use settings::{
    monitor_filter_passes, parse_priority, read_gate, Deadband, DeadbandKind, LinkSettings,
};
