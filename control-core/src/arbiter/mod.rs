//! Behavior arbiter: priority-preemptive dispatcher + control-mode state
//! machine.

mod behavior_request;
pub mod task;

pub use behavior_request::BehaviorRequest;
pub use task::{Task, TaskStatus};

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::control_mode::ControlMode;
use crate::error::ArbiterError;
use crate::priority::Priority;
use crate::queue::BehaviorPriorityQueue;

/// The one fact the arbiter polls from the alarm engine each tick. Kept as
/// a trait rather than a direct dependency on `crate::alarm::AlarmEngine`
/// so the arbiter can be unit-tested against a fake.
pub trait CriticalAlarmSource: Send + Sync {
    fn has_critical_alarm(&self) -> bool;
}

#[derive(Debug, Default)]
pub struct ArbiterStats {
    pub total_requests: AtomicU64,
    pub preemptions: AtomicU64,
    pub mode_transitions: AtomicU64,
    pub timeouts: AtomicU64,
}

fn mode_to_u8(mode: ControlMode) -> u8 {
    use ControlMode::*;
    match mode {
        Boot => 0,
        Init => 1,
        Standby => 2,
        Manual => 3,
        Ready => 4,
        Auto => 5,
        Fault => 6,
        Maint => 7,
        Charging => 8,
    }
}

fn mode_from_u8(v: u8) -> ControlMode {
    use ControlMode::*;
    match v {
        0 => Boot,
        1 => Init,
        2 => Standby,
        3 => Manual,
        4 => Ready,
        5 => Auto,
        6 => Fault,
        7 => Maint,
        _ => Charging,
    }
}

struct AtomicMode(AtomicU8);

impl AtomicMode {
    fn new(mode: ControlMode) -> Self {
        Self(AtomicU8::new(mode_to_u8(mode)))
    }

    fn load(&self) -> ControlMode {
        mode_from_u8(self.0.load(Ordering::Acquire))
    }

    fn store(&self, mode: ControlMode) {
        self.0.store(mode_to_u8(mode), Ordering::Release);
    }
}

/// The priority-preemptive dispatcher. One instance per runtime; the tick
/// loop calls `tick()` on a dedicated thread at a fixed rate (nominally
/// 10 Hz).
pub struct BehaviorArbiter {
    alarm_manager: Arc<dyn CriticalAlarmSource>,
    pending: BehaviorPriorityQueue,
    current: Mutex<Option<BehaviorRequest>>,
    suspended: Mutex<std::collections::HashMap<String, BehaviorRequest>>,
    mode: AtomicMode,
    paused: AtomicBool,
    pub stats: ArbiterStats,
}

impl BehaviorArbiter {
    pub fn new(alarm_manager: Arc<dyn CriticalAlarmSource>, queue_capacity_per_lane: usize) -> Self {
        log::info!("BehaviorArbiter initialized");
        Self {
            alarm_manager,
            pending: BehaviorPriorityQueue::new(queue_capacity_per_lane),
            current: Mutex::new(None),
            suspended: Mutex::new(std::collections::HashMap::new()),
            mode: AtomicMode::new(ControlMode::Boot),
            paused: AtomicBool::new(false),
            stats: ArbiterStats::default(),
        }
    }

    /// Submit a behavior request. Safe to call from any thread. Returns
    /// `false` only if the request's lane is full.
    pub fn request_behavior(&self, request: BehaviorRequest) -> Result<(), ArbiterError> {
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);
        let priority = request.priority;
        self.pending.try_push(request).map_err(|_| {
            log::error!("failed to enqueue behavior at priority {:?}", priority);
            ArbiterError::QueueFull(priority)
        })?;
        Ok(())
    }

    /// One scheduling decision. Bounded: never blocks on I/O, only briefly
    /// on the suspended-map mutex.
    pub fn tick(&self) {
        self.check_critical_alarms();

        if self.paused.load(Ordering::Acquire) {
            return;
        }

        let dropped = self.pending.sweep_timeouts(Instant::now());
        if dropped > 0 {
            self.stats
                .timeouts
                .fetch_add(dropped as u64, Ordering::Relaxed);
        }

        let mut current_guard = self.current.lock();

        if let Some(current) = current_guard.as_ref() {
            let status = current.task.status();
            if status.is_terminal() {
                log::info!(
                    "current task finished: {} ({:?})",
                    current.behavior_id,
                    status
                );
                *current_guard = None;
            } else {
                if let Some(candidate) = self.pending.try_pop() {
                    if Self::should_preempt(current, &candidate) {
                        drop(current_guard);
                        self.handle_preemption(candidate);
                        return;
                    } else {
                        let _ = self.pending.push_front(candidate);
                    }
                }
                return;
            }
        }

        if let Some(next) = self.pending.try_pop() {
            Self::start_task_locked(&mut current_guard, next);
        }
    }

    fn should_preempt(current: &BehaviorRequest, candidate: &BehaviorRequest) -> bool {
        candidate.priority < current.priority && candidate.priority.can_preempt()
    }

    fn handle_preemption(&self, candidate: BehaviorRequest) {
        let mut current_guard = self.current.lock();
        let Some(current) = current_guard.take() else {
            return;
        };

        log::warn!(
            "preemption: {} (P{:?}) -> {} (P{:?})",
            current.behavior_id,
            current.priority,
            candidate.behavior_id,
            candidate.priority
        );
        self.stats.preemptions.fetch_add(1, Ordering::Relaxed);

        match candidate.priority {
            Priority::EmergencyStop => {
                current.task.stop();
                drop(current_guard);
                self.transition_to(ControlMode::Fault);
                current_guard = self.current.lock();
            }
            Priority::SafetyIssue => {
                current.task.pause();
                self.suspended
                    .lock()
                    .insert(current.behavior_id.clone(), current);
            }
            Priority::UrgentTask => {
                if current.priority >= Priority::NormalTask {
                    current.task.pause();
                    self.suspended
                        .lock()
                        .insert(current.behavior_id.clone(), current);
                } else {
                    // Does not actually preempt; put the current task back
                    // and re-queue the candidate.
                    let behavior_id = current.behavior_id.clone();
                    *current_guard = Some(current);
                    let _ = self.pending.push_front(candidate);
                    log::debug!(
                        "urgent candidate did not preempt behavior {}",
                        behavior_id
                    );
                    return;
                }
            }
            Priority::NormalTask | Priority::Maintenance => {
                // Never preempts; restore current and requeue candidate.
                *current_guard = Some(current);
                let _ = self.pending.push_front(candidate);
                return;
            }
        }

        Self::start_task_locked(&mut current_guard, candidate);
    }

    fn start_task_locked(
        current_guard: &mut parking_lot::MutexGuard<'_, Option<BehaviorRequest>>,
        request: BehaviorRequest,
    ) {
        request.task.start();
        log::info!(
            "started task: {} (priority {:?})",
            request.behavior_id,
            request.priority
        );
        **current_guard = Some(request);
    }

    pub fn current_mode(&self) -> ControlMode {
        self.mode.load()
    }

    pub fn current_task_id(&self) -> Option<String> {
        self.current
            .lock()
            .as_ref()
            .map(|r| r.behavior_id.clone())
    }

    pub fn pending_behavior_count(&self) -> usize {
        self.pending.size()
    }

    /// Enforce the legal-transition table. Entering `Fault` always
    /// succeeds and cancels the current task and clears pending queues.
    pub fn transition_to(&self, new_mode: ControlMode) -> bool {
        let current = self.mode.load();
        if !current.is_valid_transition(new_mode) {
            log::warn!("invalid mode transition: {:?} -> {:?}", current, new_mode);
            return false;
        }

        if new_mode == ControlMode::Fault {
            let mut current_guard = self.current.lock();
            if let Some(request) = current_guard.take() {
                request.task.stop();
            }
            drop(current_guard);
            self.clear_pending_behaviors();
        }

        self.mode.store(new_mode);
        self.stats.mode_transitions.fetch_add(1, Ordering::Relaxed);
        log::info!("mode transition: {:?} -> {:?}", current, new_mode);
        true
    }

    pub fn clear_pending_behaviors(&self) {
        self.pending.clear();
        self.suspended.lock().clear();
        log::info!("cleared all pending behaviors");
    }

    pub fn cancel_behavior(&self, behavior_id: &str) -> Result<(), ArbiterError> {
        let mut current_guard = self.current.lock();
        if let Some(current) = current_guard.as_ref() {
            if current.behavior_id == behavior_id {
                if !current.cancellable {
                    return Err(ArbiterError::NotCancellable(behavior_id.to_string()));
                }
                current.task.stop();
                *current_guard = None;
                log::info!("cancelled current behavior: {}", behavior_id);
                return Ok(());
            }
        }
        drop(current_guard);

        if self.suspended.lock().remove(behavior_id).is_some() {
            log::info!("cancelled suspended behavior: {}", behavior_id);
            return Ok(());
        }

        Err(ArbiterError::NotFound(behavior_id.to_string()))
    }

    pub fn pause(&self) -> bool {
        if self
            .paused
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if let Some(current) = self.current.lock().as_ref() {
            current.task.pause();
        }
        log::info!("arbiter paused");
        true
    }

    pub fn resume(&self) -> bool {
        if self
            .paused
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if let Some(current) = self.current.lock().as_ref() {
            current.task.resume();
        }
        log::info!("arbiter resumed");
        true
    }

    fn check_critical_alarms(&self) {
        if self.alarm_manager.has_critical_alarm() {
            let current = self.mode.load();
            if current != ControlMode::Fault {
                log::error!("critical alarm detected, transitioning to FAULT");
                self.transition_to(ControlMode::Fault);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use task::DummyTask;

    struct NoAlarm;
    impl CriticalAlarmSource for NoAlarm {
        fn has_critical_alarm(&self) -> bool {
            false
        }
    }

    struct AlwaysCritical;
    impl CriticalAlarmSource for AlwaysCritical {
        fn has_critical_alarm(&self) -> bool {
            true
        }
    }

    fn arbiter() -> BehaviorArbiter {
        let arb = BehaviorArbiter::new(Arc::new(NoAlarm), 16);
        arb.transition_to(ControlMode::Init);
        arb.transition_to(ControlMode::Standby);
        arb
    }

    #[test]
    fn emergency_preempts_running_normal_and_forces_fault() {
        let arb = arbiter();
        arb.request_behavior(BehaviorRequest::new(
            "a",
            Priority::NormalTask,
            Arc::new(DummyTask::new()),
            "op",
        ))
        .unwrap();
        arb.tick();
        assert_eq!(arb.current_task_id().as_deref(), Some("a"));

        arb.request_behavior(BehaviorRequest::new(
            "b",
            Priority::EmergencyStop,
            Arc::new(DummyTask::new()),
            "op",
        ))
        .unwrap();
        arb.tick();

        assert_eq!(arb.current_task_id().as_deref(), Some("b"));
        // Preempting a running task always forces FAULT (handle_preemption's
        // EmergencyStop arm), unlike plain selection below.
        assert_eq!(arb.current_mode(), ControlMode::Fault);
    }

    #[test]
    fn emergency_selected_over_normal_without_forcing_fault() {
        let arb = arbiter();
        // Both requests land before the first tick, so the emergency one
        // is picked by selection (tick()'s final try_pop), never by
        // handle_preemption - selection never touches mode.
        arb.request_behavior(BehaviorRequest::new(
            "a",
            Priority::NormalTask,
            Arc::new(DummyTask::new()),
            "op",
        ))
        .unwrap();
        arb.request_behavior(BehaviorRequest::new(
            "b",
            Priority::EmergencyStop,
            Arc::new(DummyTask::new()),
            "op",
        ))
        .unwrap();
        arb.tick();

        assert_eq!(arb.current_task_id().as_deref(), Some("b"));
        assert_eq!(arb.current_mode(), ControlMode::Standby);
    }

    #[test]
    fn critical_alarm_forces_fault_within_one_tick() {
        let arb = BehaviorArbiter::new(Arc::new(AlwaysCritical), 16);
        arb.tick();
        assert_eq!(arb.current_mode(), ControlMode::Fault);
    }

    #[test]
    fn urgent_preempts_normal_and_suspends_it() {
        let arb = arbiter();
        let n1_task = Arc::new(DummyTask::new());
        arb.request_behavior(BehaviorRequest::new(
            "n1",
            Priority::NormalTask,
            n1_task.clone(),
            "op",
        ))
        .unwrap();
        arb.tick();
        assert_eq!(arb.current_task_id().as_deref(), Some("n1"));

        arb.request_behavior(BehaviorRequest::new(
            "u1",
            Priority::UrgentTask,
            Arc::new(DummyTask::new()),
            "op",
        ))
        .unwrap();
        arb.tick();

        assert_eq!(arb.current_task_id().as_deref(), Some("u1"));
        assert_eq!(n1_task.status(), TaskStatus::Paused);
        assert_eq!(arb.current_mode(), ControlMode::Standby);
    }

    #[test]
    fn transition_table_is_enforced() {
        let arb = arbiter();
        assert!(!arb.transition_to(ControlMode::Init));
        assert!(arb.transition_to(ControlMode::Auto));
        assert!(arb.transition_to(ControlMode::Fault));
    }

    #[test]
    fn fault_cancels_current_task() {
        let arb = arbiter();
        let task = Arc::new(DummyTask::new());
        arb.request_behavior(BehaviorRequest::new(
            "n1",
            Priority::NormalTask,
            task.clone(),
            "op",
        ))
        .unwrap();
        arb.tick();
        assert!(arb.transition_to(ControlMode::Fault));
        assert_eq!(task.status(), TaskStatus::Cancelled);
        assert!(arb.current_task_id().is_none());
    }
}
