//! Per-run step trace, rendered as a single report.

use std::fmt;

use chrono::{DateTime, Utc};
use ripple_core::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    ThreadRegistered,
    Compiled { expression: &'static str },
    BeforeCondition,
    AfterCondition { result: Value },
    BeforeAction,
    AfterAction { result: Value },
    Skipped { reason: String },
    Exception { message: String },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::ThreadRegistered => f.write_str("task registered"),
            Step::Compiled { expression } => write!(f, "{expression} compiled"),
            Step::BeforeCondition => f.write_str("evaluating condition"),
            Step::AfterCondition { result } => write!(f, "condition -> {result}"),
            Step::BeforeAction => f.write_str("executing action"),
            Step::AfterAction { result } => write!(f, "action -> {result}"),
            Step::Skipped { reason } => write!(f, "skipped: {reason}"),
            Step::Exception { message } => write!(f, "exception: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    pub at: DateTime<Utc>,
    pub step: Step,
}

#[derive(Debug, Clone)]
pub struct StepTrace {
    rule: String,
    started: DateTime<Utc>,
    entries: Vec<TraceEntry>,
}

impl StepTrace {
    pub fn new(rule: impl Into<String>) -> Self {
        Self::starting_at(rule, Utc::now())
    }

    pub fn starting_at(rule: impl Into<String>, started: DateTime<Utc>) -> Self {
        Self {
            rule: rule.into(),
            started,
            entries: Vec::new(),
        }
    }

    pub fn record(&mut self, step: Step) {
        self.record_at(step, Utc::now());
    }

    pub fn record_at(&mut self, step: Step, at: DateTime<Utc>) {
        self.entries.push(TraceEntry { at, step });
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn contains(&self, step: &Step) -> bool {
        self.entries.iter().any(|e| &e.step == step)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One header line, then one line per step with its offset from start.
    pub fn render(&self) -> String {
        let mut out = format!("rule '{}' run at {}", self.rule, self.started.to_rfc3339());
        for entry in &self.entries {
            let offset = entry.at.signed_duration_since(self.started).num_milliseconds();
            out.push_str(&format!("\n  +{offset}ms {}", entry.step));
        }
        out
    }
}

impl fmt::Display for StepTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
