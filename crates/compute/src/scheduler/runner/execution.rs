use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use ripple_core::sync::{lock, read, write};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::scheduler::error::ComputeError;
use crate::scheduler::types::DirtyWorkItem;

use super::core::InFlight;
use super::ComputeScheduler;

impl ComputeScheduler {
    /// Spawn the control loop on the current runtime.
    pub fn start(self: &Arc<Self>) -> Result<(), ComputeError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ComputeError::NoRuntime)?;
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(ComputeError::AlreadyRunning);
        }
        info!(
            scheduler = %self.id(),
            threads = self.threads(),
            timeout_ms = self.execution_timeout().as_millis() as u64,
            "compute scheduler starting"
        );
        let scheduler = Arc::clone(self);
        let handle = runtime.spawn(async move { scheduler.run_loop().await });
        *lock(&self.loop_handle) = Some(handle);
        Ok(())
    }

    /// Stop the loop, cancel everything in flight and forget all dirty nodes.
    /// Running actions are not awaited.
    pub fn shutdown(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(scheduler = %self.id(), "compute scheduler shutdown requested");

        let cancelled = {
            let mut in_flight = lock(&self.in_flight);
            for entry in in_flight.values() {
                entry.handle.abort();
            }
            let n = in_flight.len();
            in_flight.clear();
            n
        };
        if let Some(handle) = lock(&self.loop_handle).take() {
            handle.abort();
        }
        self.dirty.clear();
        write(&self.served).clear();
        info!(scheduler = %self.id(), cancelled, "compute scheduler stopped");
    }

    async fn run_loop(self: Arc<Self>) {
        while self.is_active() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.sweep_in_flight())) {
                error!(scheduler = %self.id(), ?panic, "sweep failed");
            }

            if self.in_flight() >= self.threads() {
                tokio::time::sleep(self.admission_backoff).await;
                continue;
            }

            // Bounded wait so timed-out work is still swept while no node is dirty.
            let item = match tokio::time::timeout(self.admission_backoff, self.dirty.take()).await {
                Ok(item) => item,
                Err(_) => continue,
            };
            if !self.is_active() {
                break;
            }

            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.drain(item))) {
                error!(scheduler = %self.id(), node = %item.node_id, ?panic, "drain failed");
            }
        }
        debug!(scheduler = %self.id(), "control loop exited");
    }

    /// Drain every queued action of the node behind `item` into the pool.
    pub(super) fn drain(&self, item: DirtyWorkItem) {
        let Some(fireable) = read(&self.served).get(&item.node_id).cloned() else {
            debug!(node = %item.node_id, "dirty node no longer served");
            write(&self.metrics).dropped_unserved += 1;
            return;
        };

        let target = fireable.node().name().to_string();
        let now = Utc::now();
        let mut submitted = 0u64;
        while let Some(action) = fireable.poll() {
            let description = action.describe();
            let task = action.into_task(now);
            let metrics = Arc::clone(&self.metrics);
            let target = target.clone();
            let label = description.clone();

            let handle = self.pool.submit(async move {
                let started = Instant::now();
                match task.await {
                    Ok(()) => {
                        let elapsed = started.elapsed();
                        debug!(target = %target, action = %label, ?elapsed, "action completed");
                        write(&metrics).record_completion();
                    }
                    Err(e) => {
                        warn!(target = %target, action = %label, error = %e, "action failed");
                        Self::record_failure(&metrics);
                    }
                }
            });

            lock(&self.in_flight).insert(
                Uuid::new_v4(),
                InFlight {
                    handle,
                    started: Instant::now(),
                    description,
                },
            );
            submitted += 1;
        }

        write(&self.metrics).submitted += submitted;
        debug!(node = %item.node_id, weight = item.weight, submitted, "drained dirty node");
        self.publish_counters();
    }

    /// Drop finished futures and cancel those past the execution timeout.
    pub(super) fn sweep_in_flight(&self) {
        let timeout = self.execution_timeout();
        let mut timed_out = 0u64;
        lock(&self.in_flight).retain(|id, entry| {
            if entry.handle.is_finished() {
                return false;
            }
            if entry.started.elapsed() > timeout {
                entry.handle.abort();
                warn!(
                    task = %id,
                    action = %entry.description,
                    timeout_ms = timeout.as_millis() as u64,
                    "action exceeded execution timeout, cancelled"
                );
                timed_out += 1;
                return false;
            }
            true
        });
        if timed_out > 0 {
            write(&self.metrics).timed_out += timed_out;
        }
        self.publish_counters();
    }
}
