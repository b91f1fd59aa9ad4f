//! Execution-time state threaded through a running sequence: variables,
//! per-action results, and the cancellation/pause flags steps and
//! branches observe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::sequence::dto::ActionExecutionResult;

/// A dynamically-typed context variable. Condition expressions compare
/// these the same way the donor's `std::any`-based variable lookup
/// does: numeric if both sides parse as numbers, string otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

impl Value {
    /// Render as the donor's `getVariableAsString` would: numbers via
    /// their natural string form, booleans as `true`/`false`.
    pub fn as_condition_string(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::String(s) => s.clone(),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// Shared, thread-safe execution state for one running sequence.
/// Parallel sub-lists each hold a reference to the same context: a
/// `Mutex` around the variable and result maps is the only
/// synchronization needed, matching the short-held-mutex style used
/// throughout the rest of the core.
pub struct ExecutionContext {
    execution_id: String,
    variables: Mutex<HashMap<String, Value>>,
    action_results: Mutex<HashMap<String, ActionExecutionResult>>,
    result_order: Mutex<Vec<String>>,
    cancel_requested: AtomicBool,
    pause_requested: AtomicBool,
}

impl ExecutionContext {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            variables: Mutex::new(HashMap::new()),
            action_results: Mutex::new(HashMap::new()),
            result_order: Mutex::new(Vec::new()),
            cancel_requested: AtomicBool::new(false),
            pause_requested: AtomicBool::new(false),
        }
    }

    pub fn with_variables(execution_id: impl Into<String>, variables: HashMap<String, Value>) -> Self {
        let ctx = Self::new(execution_id);
        *ctx.variables.lock() = variables;
        ctx
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn set_variable(&self, name: impl Into<String>, value: Value) {
        self.variables.lock().insert(name.into(), value);
    }

    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.variables.lock().get(name).cloned()
    }

    pub fn variables_snapshot(&self) -> HashMap<String, Value> {
        self.variables.lock().clone()
    }

    pub fn set_action_result(&self, result: ActionExecutionResult) {
        let mut order = self.result_order.lock();
        let mut results = self.action_results.lock();
        if !results.contains_key(&result.action_id) {
            order.push(result.action_id.clone());
        }
        results.insert(result.action_id.clone(), result);
    }

    pub fn get_action_result(&self, action_id: &str) -> Option<ActionExecutionResult> {
        self.action_results.lock().get(action_id).cloned()
    }

    pub fn has_action_result(&self, action_id: &str) -> bool {
        self.action_results.lock().contains_key(action_id)
    }

    /// Action results in the order they were first recorded.
    pub fn action_results_ordered(&self) -> Vec<ActionExecutionResult> {
        let order = self.result_order.lock();
        let results = self.action_results.lock();
        order.iter().filter_map(|id| results.get(id).cloned()).collect()
    }

    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    pub fn request_pause(&self) {
        self.pause_requested.store(true, Ordering::Release);
    }

    pub fn request_resume(&self) {
        self.pause_requested.store(false, Ordering::Release);
    }

    pub fn is_pause_requested(&self) -> bool {
        self.pause_requested.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variables_round_trip() {
        let ctx = ExecutionContext::new("exec-1");
        ctx.set_variable("battery", Value::Int(42));
        assert_eq!(ctx.get_variable("battery"), Some(Value::Int(42)));
        assert_eq!(ctx.get_variable("missing"), None);
    }

    #[test]
    fn action_results_preserve_insertion_order() {
        let ctx = ExecutionContext::new("exec-1");
        ctx.set_action_result(ActionExecutionResult {
            action_id: "b".into(),
            status: crate::sequence::dto::ActionStatus::Completed,
            progress: 1.0,
            error_message: None,
            execution_time_ms: 1,
            retry_count: 0,
        });
        ctx.set_action_result(ActionExecutionResult {
            action_id: "a".into(),
            status: crate::sequence::dto::ActionStatus::Completed,
            progress: 1.0,
            error_message: None,
            execution_time_ms: 1,
            retry_count: 0,
        });
        let ordered = ctx.action_results_ordered();
        assert_eq!(ordered[0].action_id, "b");
        assert_eq!(ordered[1].action_id, "a");
    }
}
