//! Sequence data model: definitions, steps, branch descriptors, and
//! execution results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl SequenceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SequenceStatus::Completed | SequenceStatus::Failed | SequenceStatus::Cancelled
        )
    }
}

/// One step: create an action of `action_type` with `parameters`,
/// identified by `action_id` for branch references and context lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub action_id: String,
    pub action_type: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

/// Runs when `true_actions`/`false_actions` lists, keyed off the step
/// whose `action_id` this branch is registered under, depending on
/// whether `condition` evaluates true or false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalBranch {
    pub condition: String,
    #[serde(default)]
    pub true_actions: Vec<String>,
    #[serde(default)]
    pub false_actions: Vec<String>,
}

/// Each inner `Vec<String>` is a sub-list of action ids run
/// sequentially; the sub-lists themselves run concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelBranch {
    pub branches: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BranchDescriptor {
    Conditional(ConditionalBranch),
    Parallel(ParallelBranch),
}

/// Exponential backoff between retry attempts on a failed step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 100,
            max_delay_ms: 5000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the `attempt`-th retry (0-indexed), capped at
    /// `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> std::time::Duration {
        let scaled = self.base_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        let capped = scaled.min(self.max_delay_ms as f64).max(0.0);
        std::time::Duration::from_millis(capped as u64)
    }
}

/// `id` doubles as the step-selection key for branch lookup when
/// `branches` is keyed by `action_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceDefinition {
    pub id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub steps: Vec<StepDescriptor>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default)]
    pub branches: HashMap<String, BranchDescriptor>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionExecutionResult {
    pub action_id: String,
    pub status: ActionStatus,
    pub progress: f32,
    pub error_message: Option<String>,
    pub execution_time_ms: u64,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceExecutionResult {
    pub execution_id: String,
    pub sequence_id: String,
    pub status: SequenceStatus,
    pub progress: f32,
    pub action_results: Vec<ActionExecutionResult>,
    pub total_execution_time_ms: u64,
    pub error_message: Option<String>,
}

impl SequenceExecutionResult {
    pub fn new(execution_id: impl Into<String>, sequence_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            sequence_id: sequence_id.into(),
            status: SequenceStatus::Pending,
            progress: 0.0,
            action_results: Vec::new(),
            total_execution_time_ms: 0,
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_grows_exponentially_then_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 1000,
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for(0).as_millis(), 100);
        assert_eq!(policy.delay_for(1).as_millis(), 200);
        assert_eq!(policy.delay_for(2).as_millis(), 400);
        assert_eq!(policy.delay_for(10).as_millis(), 1000);
    }
}
