//! Compute scheduler runner -- owns the dirty queue, served nodes and in-flight actions.
//!
//! Split into focused submodules:
//! - `core`: ComputeScheduler struct, constructor, runtime knobs and accessors
//! - `execution`: control loop, draining, in-flight sweep and shutdown
//! - `scheduling`: dirty-node bookkeeping driven by queue-size notifications

mod core;
mod execution;
mod scheduling;

pub use self::core::ComputeScheduler;
