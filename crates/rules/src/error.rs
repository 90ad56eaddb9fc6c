use ripple_core::Value;
use thiserror::Error;

/// Failures reported by an [`ExpressionEngine`](crate::ExpressionEngine).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExpressionError {
    #[error("Compilation error: {0}")]
    Compilation(String),

    #[error("Execution error: {0}")]
    Execution(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuleError {
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error("{0} expression is not compiled")]
    NotCompiled(&'static str),

    #[error("Condition did not yield a boolean: {0}")]
    NonBooleanCondition(Value),

    #[error("Rule dispatcher already running")]
    AlreadyRunning,

    #[error("No tokio runtime available")]
    NoRuntime,
}
