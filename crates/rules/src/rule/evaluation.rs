use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use ripple_core::sync::write;
use ripple_core::{Event, Value};
use tracing::{debug, error, info, warn};

use crate::error::RuleError;
use crate::expression::EvalContext;
use crate::listener::RuleListener;
use crate::trace::{Step, StepTrace};

use super::{Rule, RULE_FIRED};

/// Counts a run for as long as it lives, including when the run is aborted.
struct RunningGuard<'a>(&'a AtomicUsize);

impl<'a> RunningGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Rule {
    /// One evaluation: condition, then action if the condition holds.
    ///
    /// Faults are logged and reported to listeners, never returned. Unless a
    /// listener vetoes the run, `last_run` is stamped and, when configured,
    /// fact memory is cleared whatever the outcome.
    pub async fn run(&self) -> StepTrace {
        let mut trace = StepTrace::new(self.name());
        self.dirty.store(false, Ordering::SeqCst);
        let _running = RunningGuard::enter(&self.running);
        trace.record(Step::ThreadRegistered);

        let listeners = self.listeners();
        if !listeners.iter().all(|l| l.before_evaluate(self)) {
            debug!(rule = %self.name(), "run vetoed by listener");
            trace.record(Step::Skipped {
                reason: "vetoed by listener".to_string(),
            });
            return trace;
        }

        self.evaluate(&listeners, &mut trace).await;

        if self.clear_facts_after_execution {
            self.facts.clear();
            self.publish_fact_count();
        }
        *write(&self.last_run) = Some(Utc::now());
        trace
    }

    async fn evaluate(&self, listeners: &[Arc<dyn RuleListener>], trace: &mut StepTrace) {
        if !self.evaluation_delay.is_zero() {
            tokio::time::sleep(self.evaluation_delay).await;
        }

        let Some(condition) = self.condition() else {
            self.failed(listeners, trace, RuleError::NotCompiled("condition"));
            return;
        };
        trace.record(Step::Compiled { expression: "condition" });

        let context = EvalContext {
            rule: self.info(),
            facts: self.facts(),
        };

        trace.record(Step::BeforeCondition);
        let verdict = match self.engine.execute(&condition, &context).await {
            Ok(verdict) => verdict,
            Err(e) => {
                self.fault(listeners, trace, e.into());
                return;
            }
        };
        trace.record(Step::AfterCondition {
            result: verdict.clone(),
        });

        match verdict {
            Value::Bool(true) => {}
            Value::Bool(false) => {
                debug!(rule = %self.name(), facts = context.facts.len(), "condition false");
                for listener in listeners {
                    listener.on_condition_false(self);
                }
                return;
            }
            other => {
                self.failed(listeners, trace, RuleError::NonBooleanCondition(other));
                return;
            }
        }

        if !self.execution_delay.is_zero() {
            tokio::time::sleep(self.execution_delay).await;
        }

        let Some(action) = self.action() else {
            self.failed(listeners, trace, RuleError::NotCompiled("action"));
            return;
        };
        trace.record(Step::Compiled { expression: "action" });

        trace.record(Step::BeforeAction);
        match self.engine.execute(&action, &context).await {
            Ok(result) => {
                trace.record(Step::AfterAction {
                    result: result.clone(),
                });
                self.emit_fired(&result);
                info!(rule = %self.name(), result = %result, "rule fired");
                for listener in listeners {
                    listener.on_fired(self, &result);
                }
            }
            Err(e) => self.fault(listeners, trace, e.into()),
        }
    }

    fn emit_fired(&self, result: &Value) {
        let message = match result {
            Value::Null => format!("Rule '{}' fired", self.name()),
            Value::String(text) => format!("Rule '{}' fired: {}", self.name(), text),
            other => format!("Rule '{}' fired: {}", self.name(), other),
        };
        self.node.emit_event(
            Event::new(RULE_FIRED, self.id())
                .with_message(message)
                .with_payload(result.clone()),
        );
    }

    fn failed(&self, listeners: &[Arc<dyn RuleListener>], trace: &mut StepTrace, err: RuleError) {
        warn!(rule = %self.name(), error = %err, "rule evaluation failed");
        trace.record(Step::Skipped {
            reason: err.to_string(),
        });
        for listener in listeners {
            listener.on_evaluation_failed(self, &err);
        }
    }

    fn fault(&self, listeners: &[Arc<dyn RuleListener>], trace: &mut StepTrace, err: RuleError) {
        error!(rule = %self.name(), error = %err, "rule fault");
        trace.record(Step::Exception {
            message: err.to_string(),
        });
        for listener in listeners {
            listener.on_fault(self, &err);
        }
    }
}
