use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ripple_core::{NodeId, Value};

use crate::error::ExpressionError;
use crate::fact::CachedFact;

/// An engine-specific compiled program, tagged with its source text.
#[derive(Clone)]
pub struct CompiledExpr {
    source: String,
    program: Arc<dyn Any + Send + Sync>,
}

impl CompiledExpr {
    pub fn new<P: Any + Send + Sync>(source: impl Into<String>, program: P) -> Self {
        Self {
            source: source.into(),
            program: Arc::new(program),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The program, if it was produced by an engine using `P`.
    pub fn program<P: Any>(&self) -> Option<&P> {
        self.program.downcast_ref::<P>()
    }
}

impl fmt::Debug for CompiledExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledExpr").field("source", &self.source).finish()
    }
}

/// What a rule exposes about itself to its expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleInfo {
    pub id: NodeId,
    pub name: String,
    pub priority: i32,
    pub debug_level: i64,
}

#[derive(Debug, Clone)]
pub struct EvalContext {
    pub rule: RuleInfo,
    /// Facts valid when the evaluation started.
    pub facts: Vec<CachedFact>,
}

impl EvalContext {
    /// Most recent valid fact with the given name.
    pub fn latest(&self, name: &str) -> Option<&CachedFact> {
        self.facts
            .iter()
            .filter(|f| f.fact.name == name)
            .max_by_key(|f| f.created_at)
    }
}

/// The condition/action language. Compilation happens when a rule is
/// created or its `condition`/`action` property is written.
#[async_trait]
pub trait ExpressionEngine: Send + Sync {
    fn compile(&self, source: &str) -> Result<CompiledExpr, ExpressionError>;

    async fn execute(&self, expr: &CompiledExpr, context: &EvalContext) -> Result<Value, ExpressionError>;
}
