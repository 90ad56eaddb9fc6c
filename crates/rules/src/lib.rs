//! Condition/action rules over time-bounded fact memory.
//!
//! - [`fact`]: facts and the memory that expires them
//! - [`expression`]: the pluggable condition/action language
//! - [`rule`]: dirtiness, refractory period and evaluation
//! - [`dispatcher`]: the loop that runs dirty rules under a deadline

pub mod dispatcher;
pub mod error;
pub mod expression;
pub mod fact;
pub mod listener;
pub mod rule;
pub mod trace;

#[cfg(test)]
pub(crate) mod test_support;

pub use dispatcher::{DispatchMetrics, RuleDispatcher};
pub use error::{ExpressionError, RuleError};
pub use expression::{CompiledExpr, EvalContext, ExpressionEngine, RuleInfo};
pub use fact::{CachedFact, Fact, FactKind, FactMemory};
pub use listener::RuleListener;
pub use rule::{clamp_priority, Rule, RuleSpec, DEFAULT_RULE_PRIORITY, RULE_FIRED};
pub use trace::{Step, StepTrace, TraceEntry};
