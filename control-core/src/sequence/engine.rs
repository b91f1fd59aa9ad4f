//! Drives a [`SequenceDefinition`] to completion: sequential steps with
//! retry, conditional branches keyed by `action_id`, and parallel
//! branches whose sub-lists run on their own threads.
//!
//! Grounded on the donor's `SequenceEngine.cpp` (`execute` /
//! `executeSequential` / `handleConditionalBranch` / cancel / pause /
//! resume / getStatus / getProgress) and `sequence.old/core/
//! ParallelBranch.h` (branch groups run concurrently, each group
//! sequential, success requires every group to succeed).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::sequence::action::ActionFactory;
use crate::sequence::context::ExecutionContext;
use crate::sequence::dto::{
    ActionExecutionResult, ActionStatus, BranchDescriptor, SequenceDefinition, SequenceExecutionResult,
    SequenceStatus, StepDescriptor,
};

struct SequenceState {
    status: Mutex<SequenceStatus>,
    total_steps: u32,
    completed_steps: AtomicU32,
    cancel_requested: AtomicBool,
    pause_requested: AtomicBool,
    context: Arc<ExecutionContext>,
}

impl SequenceState {
    fn progress(&self) -> f32 {
        if self.total_steps == 0 {
            return 0.0;
        }
        self.completed_steps.load(Ordering::Acquire) as f32 / self.total_steps as f32
    }
}

/// Executes [`SequenceDefinition`]s against actions produced by a
/// registered [`ActionFactory`]. Keeps one [`SequenceState`] per
/// `execution_id` so the same definition can run concurrently under
/// distinct execution ids.
pub struct SequenceEngine {
    factory: Arc<dyn ActionFactory>,
    states: Mutex<HashMap<String, Arc<SequenceState>>>,
}

impl SequenceEngine {
    pub fn new(factory: Arc<dyn ActionFactory>) -> Self {
        Self {
            factory,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Run `definition` to completion under `context`'s execution id.
    /// Blocks the calling thread for the lifetime of the sequence.
    pub fn execute(
        &self,
        definition: &SequenceDefinition,
        context: Arc<ExecutionContext>,
    ) -> SequenceExecutionResult {
        let execution_id = context.execution_id().to_string();
        log::info!(
            "executing sequence {} (execution {}, name: {})",
            definition.id,
            execution_id,
            definition.name
        );

        let state = Arc::new(SequenceState {
            status: Mutex::new(SequenceStatus::Running),
            total_steps: definition.steps.len() as u32,
            completed_steps: AtomicU32::new(0),
            cancel_requested: AtomicBool::new(false),
            pause_requested: AtomicBool::new(false),
            context: context.clone(),
        });
        self.states.lock().insert(execution_id.clone(), state.clone());

        let start = Instant::now();
        let mut result = SequenceExecutionResult::new(execution_id.clone(), definition.id.clone());
        result.status = SequenceStatus::Running;

        self.execute_sequential(definition, &context, &state, &mut result);

        result.total_execution_time_ms = start.elapsed().as_millis() as u64;
        result.progress = state.progress();
        result.action_results = context.action_results_ordered();

        log::info!(
            "sequence {} (execution {}) finished with status {:?} ({}/{} steps)",
            definition.id,
            result.execution_id,
            result.status,
            state.completed_steps.load(Ordering::Acquire),
            state.total_steps
        );

        result
    }

    fn execute_sequential(
        &self,
        definition: &SequenceDefinition,
        context: &ExecutionContext,
        state: &Arc<SequenceState>,
        result: &mut SequenceExecutionResult,
    ) {
        let mut executed: HashSet<String> = HashSet::new();

        for (index, step) in definition.steps.iter().enumerate() {
            if state.cancel_requested.load(Ordering::Acquire) || context.is_cancel_requested() {
                log::info!("sequence {} cancelled at step {}", definition.id, index);
                *state.status.lock() = SequenceStatus::Cancelled;
                result.status = SequenceStatus::Cancelled;
                result.error_message = Some(format!("cancelled at step {index}"));
                return;
            }

            while (state.pause_requested.load(Ordering::Acquire) || context.is_pause_requested())
                && !state.cancel_requested.load(Ordering::Acquire)
            {
                std::thread::sleep(std::time::Duration::from_millis(100));
            }

            log::info!(
                "sequence {}: step {}/{} - {} (type {})",
                definition.id,
                index + 1,
                definition.steps.len(),
                step.action_id,
                step.action_type
            );

            let action_result = execute_step_with_retry(self.factory.as_ref(), step, definition.retry_policy, index);
            context.set_action_result(action_result.clone());
            executed.insert(step.action_id.clone());

            if action_result.status == ActionStatus::Failed {
                log::error!(
                    "sequence {}: step {} ({}) failed: {}",
                    definition.id,
                    index + 1,
                    step.action_id,
                    action_result.error_message.clone().unwrap_or_default()
                );
                *state.status.lock() = SequenceStatus::Failed;
                result.status = SequenceStatus::Failed;
                result.error_message = Some(format!(
                    "step {} ({}) failed after {} retries: {}",
                    index + 1,
                    step.action_id,
                    action_result.retry_count,
                    action_result.error_message.unwrap_or_default()
                ));
                return;
            }

            state.completed_steps.fetch_add(1, Ordering::AcqRel);
            self.handle_branch(definition, context, state, &step.action_id, &mut executed);
        }

        *state.status.lock() = SequenceStatus::Completed;
        result.status = SequenceStatus::Completed;
    }

    /// Dispatches the branch (if any) registered under `action_id`.
    /// Returns the number of additional steps it ran, for progress
    /// accounting.
    fn handle_branch(
        &self,
        definition: &SequenceDefinition,
        context: &ExecutionContext,
        state: &Arc<SequenceState>,
        action_id: &str,
        executed: &mut HashSet<String>,
    ) -> u32 {
        let Some(branch) = definition.branches.get(action_id) else {
            return 0;
        };

        match branch {
            BranchDescriptor::Conditional(cond) => {
                let outcome = match crate::sequence::condition::evaluate(&cond.condition, context) {
                    Ok(v) => v,
                    Err(e) => {
                        log::error!(
                            "sequence {}: failed to evaluate condition '{}': {}",
                            definition.id,
                            cond.condition,
                            e
                        );
                        return 0;
                    }
                };
                log::info!(
                    "sequence {}: condition '{}' evaluated to {}",
                    definition.id,
                    cond.condition,
                    outcome
                );
                let targets = if outcome { &cond.true_actions } else { &cond.false_actions };
                let mut ran = 0;
                for target_id in targets {
                    if executed.contains(target_id) {
                        continue;
                    }
                    let Some(step) = definition.steps.iter().find(|s| &s.action_id == target_id) else {
                        log::warn!("sequence {}: branch action '{}' not found in steps", definition.id, target_id);
                        continue;
                    };
                    let action_result = execute_step_with_retry(self.factory.as_ref(), step, definition.retry_policy, 0);
                    if action_result.status == ActionStatus::Failed {
                        log::error!(
                            "sequence {}: branch action {} failed: {}",
                            definition.id,
                            step.action_id,
                            action_result.error_message.clone().unwrap_or_default()
                        );
                    }
                    context.set_action_result(action_result);
                    executed.insert(target_id.clone());
                    state.completed_steps.fetch_add(1, Ordering::AcqRel);
                    ran += 1;
                }
                ran
            }
            BranchDescriptor::Parallel(parallel) => {
                let factory = self.factory.clone();
                let retry_policy = definition.retry_policy;
                let groups: Vec<Vec<StepDescriptor>> = parallel
                    .branches
                    .iter()
                    .map(|group| {
                        group
                            .iter()
                            .filter_map(|id| definition.steps.iter().find(|s| &s.action_id == id).cloned())
                            .collect()
                    })
                    .collect();

                let handles: Vec<_> = groups
                    .into_iter()
                    .map(|group| {
                        let factory = factory.clone();
                        std::thread::spawn(move || -> Vec<ActionExecutionResult> {
                            let mut results = Vec::with_capacity(group.len());
                            for step in &group {
                                let r = execute_step_with_retry(factory.as_ref(), step, retry_policy, 0);
                                let failed = r.status == ActionStatus::Failed;
                                results.push(r);
                                if failed {
                                    break;
                                }
                            }
                            results
                        })
                    })
                    .collect();

                let mut ran = 0;
                for handle in handles {
                    let group_results = handle.join().unwrap_or_default();
                    for r in group_results {
                        executed.insert(r.action_id.clone());
                        context.set_action_result(r);
                        state.completed_steps.fetch_add(1, Ordering::AcqRel);
                        ran += 1;
                    }
                }
                ran
            }
        }
    }

    pub fn cancel(&self, execution_id: &str) {
        if let Some(state) = self.states.lock().get(execution_id) {
            state.cancel_requested.store(true, Ordering::Release);
            state.context.request_cancel();
            log::info!("cancel requested for execution {execution_id}");
        }
    }

    pub fn pause(&self, execution_id: &str) {
        if let Some(state) = self.states.lock().get(execution_id) {
            state.pause_requested.store(true, Ordering::Release);
            state.context.request_pause();
            *state.status.lock() = SequenceStatus::Paused;
            log::info!("pause requested for execution {execution_id}");
        }
    }

    pub fn resume(&self, execution_id: &str) {
        if let Some(state) = self.states.lock().get(execution_id) {
            state.pause_requested.store(false, Ordering::Release);
            state.context.request_resume();
            *state.status.lock() = SequenceStatus::Running;
            log::info!("resume requested for execution {execution_id}");
        }
    }

    pub fn get_status(&self, execution_id: &str) -> SequenceStatus {
        match self.states.lock().get(execution_id) {
            Some(state) => *state.status.lock(),
            None => SequenceStatus::Pending,
        }
    }

    pub fn get_progress(&self, execution_id: &str) -> f32 {
        match self.states.lock().get(execution_id) {
            Some(state) => state.progress(),
            None => 0.0,
        }
    }

    pub fn get_execution_context(&self, execution_id: &str) -> Option<Arc<ExecutionContext>> {
        self.states.lock().get(execution_id).map(|s| s.context.clone())
    }
}

fn execute_step_with_retry(
    factory: &dyn ActionFactory,
    step: &StepDescriptor,
    retry_policy: Option<crate::sequence::dto::RetryPolicy>,
    step_index: usize,
) -> ActionExecutionResult {
    let mut params: HashMap<String, String> = step.parameters.clone();
    params.entry("id".to_string()).or_insert_with(|| step.action_id.clone());

    let max_attempts = retry_policy.map(|p| p.max_attempts).unwrap_or(1).max(1);
    let mut retry_count = 0u32;
    let started = Instant::now();

    loop {
        let outcome = match factory.create_action(&step.action_type, &step.action_id, &params) {
            Ok(action) => action.execute().map(|_| action.progress()),
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(progress) => {
                return ActionExecutionResult {
                    action_id: step.action_id.clone(),
                    status: ActionStatus::Completed,
                    progress,
                    error_message: None,
                    execution_time_ms: started.elapsed().as_millis() as u64,
                    retry_count,
                };
            }
            Err(message) => {
                if retry_count + 1 < max_attempts {
                    if let Some(policy) = retry_policy {
                        log::warn!(
                            "step {} ({}) failed, retrying ({}/{}): {}",
                            step_index + 1,
                            step.action_id,
                            retry_count + 1,
                            policy.max_attempts,
                            message
                        );
                        std::thread::sleep(policy.delay_for(retry_count));
                    }
                    retry_count += 1;
                    continue;
                }
                return ActionExecutionResult {
                    action_id: step.action_id.clone(),
                    status: ActionStatus::Failed,
                    progress: 0.0,
                    error_message: Some(message),
                    execution_time_ms: started.elapsed().as_millis() as u64,
                    retry_count,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::action::test_support::ScriptedActionFactory;
    use crate::sequence::dto::{ConditionalBranch, ParallelBranch, RetryPolicy};
    use crate::sequence::context::Value;

    fn step(id: &str, action_type: &str) -> StepDescriptor {
        StepDescriptor {
            action_id: id.to_string(),
            action_type: action_type.to_string(),
            parameters: HashMap::new(),
        }
    }

    #[test]
    fn sequential_execution_completes() {
        let engine = SequenceEngine::new(Arc::new(ScriptedActionFactory::default()));
        let def = SequenceDefinition {
            id: "seq-1".into(),
            name: "two steps".into(),
            version: "1.0.0".into(),
            steps: vec![step("a", "move"), step("b", "grip")],
            retry_policy: None,
            branches: HashMap::new(),
        };
        let ctx = Arc::new(ExecutionContext::new("exec-1"));
        let result = engine.execute(&def, ctx);
        assert_eq!(result.status, SequenceStatus::Completed);
        assert_eq!(result.action_results.len(), 2);
        assert_eq!(engine.get_status("exec-1"), SequenceStatus::Completed);
        assert!((engine.get_progress("exec-1") - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn retries_then_fails_after_exhausting_policy() {
        let engine = SequenceEngine::new(Arc::new(ScriptedActionFactory::default()));
        let def = SequenceDefinition {
            id: "seq-2".into(),
            name: "always fails".into(),
            version: "1.0.0".into(),
            steps: vec![step("a", "always_fail")],
            retry_policy: Some(RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 5,
                multiplier: 2.0,
            }),
            branches: HashMap::new(),
        };
        let ctx = Arc::new(ExecutionContext::new("exec-2"));
        let result = engine.execute(&def, ctx);
        assert_eq!(result.status, SequenceStatus::Failed);
        assert_eq!(result.action_results[0].retry_count, 2);
    }

    #[test]
    fn succeeds_after_transient_failures_within_retry_budget() {
        let engine = SequenceEngine::new(Arc::new(ScriptedActionFactory::default()));
        let def = SequenceDefinition {
            id: "seq-3".into(),
            name: "flaky then ok".into(),
            version: "1.0.0".into(),
            steps: vec![step("a", "fail:2")],
            retry_policy: Some(RetryPolicy {
                max_attempts: 5,
                base_delay_ms: 1,
                max_delay_ms: 5,
                multiplier: 1.5,
            }),
            branches: HashMap::new(),
        };
        let ctx = Arc::new(ExecutionContext::new("exec-3"));
        let result = engine.execute(&def, ctx);
        assert_eq!(result.status, SequenceStatus::Completed);
        assert_eq!(result.action_results[0].retry_count, 2);
    }

    #[test]
    fn conditional_branch_runs_true_actions() {
        let engine = SequenceEngine::new(Arc::new(ScriptedActionFactory::default()));
        let mut branches = HashMap::new();
        branches.insert(
            "check".to_string(),
            BranchDescriptor::Conditional(ConditionalBranch {
                condition: "battery > 50".to_string(),
                true_actions: vec!["charge_skip".to_string()],
                false_actions: vec!["charge_now".to_string()],
            }),
        );
        let def = SequenceDefinition {
            id: "seq-4".into(),
            name: "conditional".into(),
            version: "1.0.0".into(),
            steps: vec![step("check", "noop"), step("charge_skip", "noop"), step("charge_now", "noop")],
            retry_policy: None,
            branches,
        };
        let ctx = Arc::new(ExecutionContext::new("exec-4"));
        ctx.set_variable("battery", Value::Int(80));
        let result = engine.execute(&def, ctx.clone());
        assert_eq!(result.status, SequenceStatus::Completed);
        assert!(ctx.has_action_result("charge_skip"));
        assert!(!ctx.has_action_result("charge_now"));
    }

    #[test]
    fn parallel_branch_runs_all_groups() {
        let engine = SequenceEngine::new(Arc::new(ScriptedActionFactory::default()));
        let mut branches = HashMap::new();
        branches.insert(
            "setup".to_string(),
            BranchDescriptor::Parallel(ParallelBranch {
                branches: vec![
                    vec!["move_arm".to_string(), "calibrate_arm".to_string()],
                    vec!["open_gripper".to_string()],
                ],
            }),
        );
        let def = SequenceDefinition {
            id: "seq-5".into(),
            name: "parallel".into(),
            version: "1.0.0".into(),
            steps: vec![
                step("setup", "noop"),
                step("move_arm", "noop"),
                step("calibrate_arm", "noop"),
                step("open_gripper", "noop"),
            ],
            retry_policy: None,
            branches,
        };
        let ctx = Arc::new(ExecutionContext::new("exec-5"));
        let result = engine.execute(&def, ctx.clone());
        assert_eq!(result.status, SequenceStatus::Completed);
        assert!(ctx.has_action_result("move_arm"));
        assert!(ctx.has_action_result("calibrate_arm"));
        assert!(ctx.has_action_result("open_gripper"));
    }

    #[test]
    fn cancel_stops_before_next_step() {
        let engine = Arc::new(SequenceEngine::new(Arc::new(ScriptedActionFactory::default())));
        let def = Arc::new(SequenceDefinition {
            id: "seq-6".into(),
            name: "cancel me".into(),
            version: "1.0.0".into(),
            steps: vec![step("a", "noop"), step("b", "noop"), step("c", "noop")],
            retry_policy: None,
            branches: HashMap::new(),
        });
        let ctx = Arc::new(ExecutionContext::new("exec-6"));
        ctx.request_cancel();
        let result = engine.execute(&def, ctx);
        assert_eq!(result.status, SequenceStatus::Cancelled);
    }
}
