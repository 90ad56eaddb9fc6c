//! Node model and the in-memory graph the reactive core runs against.
//!
//! Storage and traversal belong to the host system; this crate only carries
//! what propagation and scheduling need: nodes with a property map and
//! observers, an id/name index, and a delay timer.

pub mod error;
pub mod node;
pub mod store;
pub mod timer;

pub use error::GraphError;
pub use node::{FnObserver, Node, NodeObserver};
pub use store::{GraphStats, GraphStore};
pub use timer::Timer;
