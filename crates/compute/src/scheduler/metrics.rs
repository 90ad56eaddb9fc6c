use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scheduler operational counters, published on request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Actions handed to the execution pool.
    pub submitted: u64,
    /// Actions whose handler returned `Ok`.
    pub completed: u64,
    /// Actions whose handler returned an error.
    pub failed: u64,
    /// Actions cancelled for overrunning the execution timeout.
    pub timed_out: u64,
    /// Dirty items taken for nodes no longer being served.
    pub dropped_unserved: u64,
    pub last_completed: Option<DateTime<Utc>>,
}

impl SchedulerMetrics {
    pub fn record_completion(&mut self) {
        self.completed += 1;
        self.last_completed = Some(Utc::now());
    }

    /// Actions submitted and not yet accounted for as finished.
    pub fn outstanding(&self) -> u64 {
        self.submitted
            .saturating_sub(self.completed + self.failed + self.timed_out)
    }
}
