//! Scripted expression engine and recording listener for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ripple_core::Value;

use crate::error::{ExpressionError, RuleError};
use crate::expression::{CompiledExpr, EvalContext, ExpressionEngine};
use crate::fact::CachedFact;
use crate::listener::RuleListener;
use crate::rule::Rule;

/// Programs understood by [`ScriptEngine`].
#[derive(Debug, Clone)]
enum Script {
    Const(Value),
    Fail,
    /// Sleep, then yield `true`.
    Sleep(u64),
    FactsAtLeast(usize),
}

/// `true`, `false`, `null`, numbers, `fail`, `sleep:<ms>`, `facts>=<n>`;
/// anything starting with `bad` fails to compile; other text yields itself.
#[derive(Default)]
pub(crate) struct ScriptEngine {
    pub(crate) executed: AtomicUsize,
    pub(crate) order: Mutex<Vec<String>>,
}

impl ScriptEngine {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExpressionEngine for ScriptEngine {
    fn compile(&self, source: &str) -> Result<CompiledExpr, ExpressionError> {
        let source = source.trim();
        let script = if source.starts_with("bad") {
            return Err(ExpressionError::Compilation(format!("unexpected token in '{source}'")));
        } else if source == "fail" {
            Script::Fail
        } else if let Some(ms) = source.strip_prefix("sleep:") {
            Script::Sleep(ms.parse().map_err(|_| ExpressionError::Compilation(source.to_string()))?)
        } else if let Some(n) = source.strip_prefix("facts>=") {
            Script::FactsAtLeast(n.parse().map_err(|_| ExpressionError::Compilation(source.to_string()))?)
        } else {
            Script::Const(serde_json::from_str(source).unwrap_or_else(|_| Value::from(source)))
        };
        Ok(CompiledExpr::new(source, script))
    }

    async fn execute(&self, expr: &CompiledExpr, context: &EvalContext) -> Result<Value, ExpressionError> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        self.order.lock().unwrap().push(context.rule.name.clone());
        let script = expr
            .program::<Script>()
            .cloned()
            .ok_or_else(|| ExpressionError::Execution("foreign program".into()))?;
        match script {
            Script::Const(value) => Ok(value),
            Script::Fail => Err(ExpressionError::Execution("division by zero".into())),
            Script::Sleep(ms) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(Value::Bool(true))
            }
            Script::FactsAtLeast(n) => Ok(Value::Bool(context.facts.len() >= n)),
        }
    }
}

#[derive(Default)]
pub(crate) struct Recording {
    pub(crate) veto: bool,
    pub(crate) before: AtomicUsize,
    pub(crate) condition_false: AtomicUsize,
    pub(crate) evaluation_failed: Mutex<Vec<RuleError>>,
    pub(crate) fired: Mutex<Vec<Value>>,
    pub(crate) faults: Mutex<Vec<RuleError>>,
    pub(crate) expired: AtomicUsize,
}

impl Recording {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn vetoing() -> Arc<Self> {
        Arc::new(Self {
            veto: true,
            ..Self::default()
        })
    }

    pub(crate) fn fired(&self) -> usize {
        self.fired.lock().unwrap().len()
    }
}

impl RuleListener for Recording {
    fn before_evaluate(&self, _rule: &Rule) -> bool {
        self.before.fetch_add(1, Ordering::SeqCst);
        !self.veto
    }

    fn on_condition_false(&self, _rule: &Rule) {
        self.condition_false.fetch_add(1, Ordering::SeqCst);
    }

    fn on_evaluation_failed(&self, _rule: &Rule, error: &RuleError) {
        self.evaluation_failed.lock().unwrap().push(error.clone());
    }

    fn on_fired(&self, _rule: &Rule, result: &Value) {
        self.fired.lock().unwrap().push(result.clone());
    }

    fn on_fault(&self, _rule: &Rule, error: &RuleError) {
        self.faults.lock().unwrap().push(error.clone());
    }

    fn on_fact_expired(&self, _rule: &Rule, _fact: &CachedFact) {
        self.expired.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) async fn wait_until(limit: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
