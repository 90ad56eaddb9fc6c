use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use ripple_core::sync::{lock, read, write};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::RuleError;
use crate::rule::Rule;
use crate::trace::StepTrace;

use super::{RuleDispatcher, RuleRun};

impl RuleDispatcher {
    /// Spawn the dispatch loop on the current runtime.
    pub fn start(self: &Arc<Self>) -> Result<(), RuleError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| RuleError::NoRuntime)?;
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(RuleError::AlreadyRunning);
        }
        info!(
            rules = self.rule_count(),
            poll_ms = self.config.poll_interval_ms,
            "rule dispatcher starting"
        );
        let dispatcher = Arc::clone(self);
        let handle = runtime.spawn(async move { dispatcher.run_loop().await });
        *lock(&self.loop_handle) = Some(handle);
        Ok(())
    }

    /// Stop the loop and abort every run in flight without waiting.
    pub fn shutdown(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let cancelled = {
            let mut in_flight = lock(&self.in_flight);
            for run in in_flight.values() {
                run.handle.abort();
            }
            let n = in_flight.len();
            in_flight.clear();
            n
        };
        if let Some(handle) = lock(&self.loop_handle).take() {
            handle.abort();
        }
        info!(cancelled, "rule dispatcher stopped");
    }

    async fn run_loop(self: Arc<Self>) {
        while self.is_active() {
            if self.rule_count() == 0 {
                tokio::time::sleep(self.config.idle_backoff()).await;
                continue;
            }

            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.submit_dirty())) {
                error!(?panic, "rule submission failed");
            }
            if let Err(panic) = AssertUnwindSafe(self.sweep()).catch_unwind().await {
                error!(?panic, "rule sweep failed");
            }

            tokio::time::sleep(self.config.poll_interval()).await;
        }
        debug!("dispatch loop exited");
    }

    /// Dirty rules, highest priority first. Taking a rule clears its flag.
    pub(crate) fn take_dirty(&self) -> Vec<Arc<Rule>> {
        let mut dirty: Vec<Arc<Rule>> = read(&self.rules)
            .values()
            .filter(|rule| rule.take_dirty())
            .cloned()
            .collect();
        dirty.sort_by(|a, b| b.priority().cmp(&a.priority()));
        dirty
    }

    pub(crate) fn submit_dirty(&self) {
        let dirty = self.take_dirty();
        if dirty.is_empty() {
            return;
        }
        let submitted = dirty.len() as u64;
        let mut in_flight = lock(&self.in_flight);
        for rule in dirty {
            let deadline = Instant::now() + rule.execution_timeout();
            let task_rule = Arc::clone(&rule);
            let handle = tokio::spawn(async move { task_rule.run().await });
            debug!(rule = %rule.name(), priority = rule.priority(), "rule submitted");
            in_flight.insert(Uuid::new_v4(), RuleRun { rule, handle, deadline });
        }
        drop(in_flight);
        write(&self.metrics).submitted += submitted;
    }

    /// Abort overdue runs, then collect and log the traces of finished ones.
    pub(crate) async fn sweep(&self) {
        let now = Instant::now();
        let settled: Vec<RuleRun> = {
            let mut in_flight = lock(&self.in_flight);
            let ids: Vec<Uuid> = in_flight
                .iter()
                .filter(|(_, run)| run.handle.is_finished() || now >= run.deadline)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| in_flight.remove(id)).collect()
        };

        for RuleRun { rule, handle, .. } in settled {
            if !handle.is_finished() {
                handle.abort();
                warn!(
                    rule = %rule.name(),
                    timeout_ms = rule.execution_timeout().as_millis() as u64,
                    "rule run exceeded execution timeout, cancelled"
                );
                write(&self.metrics).timed_out += 1;
                continue;
            }

            match tokio::time::timeout(self.config.trace_wait(), handle).await {
                Ok(Ok(trace)) => {
                    write(&self.metrics).completed += 1;
                    log_trace(&rule, &trace);
                }
                Ok(Err(e)) => {
                    error!(rule = %rule.name(), error = %e, "rule run panicked");
                    write(&self.metrics).failed += 1;
                }
                Err(_) => {
                    warn!(rule = %rule.name(), "step trace not available in time, dropped");
                    write(&self.metrics).traces_dropped += 1;
                }
            }
        }
    }
}

fn log_trace(rule: &Rule, trace: &StepTrace) {
    if rule.debug_level() > 0 {
        info!(rule = %rule.name(), "{}", trace.render());
    } else {
        debug!(rule = %rule.name(), "{}", trace.render());
    }
}
