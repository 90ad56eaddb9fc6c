use ripple_core::Value;

use crate::error::RuleError;
use crate::fact::CachedFact;
use crate::rule::Rule;

/// Hooks into a rule's evaluation. Every method has a no-op default.
pub trait RuleListener: Send + Sync {
    /// Returning `false` aborts the run before the condition is evaluated.
    fn before_evaluate(&self, _rule: &Rule) -> bool {
        true
    }

    fn on_condition_false(&self, _rule: &Rule) {}

    /// The condition could not be evaluated to a boolean.
    fn on_evaluation_failed(&self, _rule: &Rule, _error: &RuleError) {}

    fn on_fired(&self, _rule: &Rule, _result: &Value) {}

    /// The engine failed while running the condition or action.
    fn on_fault(&self, _rule: &Rule, _error: &RuleError) {}

    fn on_fact_expired(&self, _rule: &Rule, _fact: &CachedFact) {}
}
