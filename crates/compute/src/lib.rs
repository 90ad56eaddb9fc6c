pub mod scheduler;

pub use scheduler::{
    dirty_weight, ComputeError, ComputeScheduler, DirtyQueue, DirtyWorkItem, ExecutionPool,
    SchedulerMetrics,
};
