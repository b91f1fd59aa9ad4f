//! The abstract task lifecycle the arbiter drives.
//!
//! Concrete robot actions (move, grip, charge, ...) are external
//! collaborators; the core only ever calls through this trait.

use std::sync::atomic::{AtomicU8, Ordering};

/// Task status lattice: `Idle -> Running -> {Paused <-> Running} ->
/// {Completed, Failed, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskStatus {
    Idle = 0,
    Running = 1,
    Paused = 2,
    Completed = 3,
    Failed = 4,
    Cancelled = 5,
}

impl TaskStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => TaskStatus::Idle,
            1 => TaskStatus::Running,
            2 => TaskStatus::Paused,
            3 => TaskStatus::Completed,
            4 => TaskStatus::Failed,
            _ => TaskStatus::Cancelled,
        }
    }

    /// Status values the arbiter treats as "done running" and eligible for
    /// clearing the current slot.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Lifecycle operations the arbiter drives. Implementations own their own
/// execution (a worker thread, a sequence execution, a field-bus call);
/// `start`/`stop`/`pause`/`resume` must return promptly.
pub trait Task: Send + Sync {
    fn start(&self);
    fn stop(&self);
    fn pause(&self);
    fn resume(&self);
    fn status(&self) -> TaskStatus;
    /// Progress in `[0, 1]`.
    fn progress(&self) -> f64;
}

/// Minimal in-process [`Task`] used by unit tests across the queue and
/// arbiter modules.
#[cfg(test)]
pub struct DummyTask {
    status: AtomicU8,
}

#[cfg(test)]
impl DummyTask {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(TaskStatus::Idle as u8),
        }
    }

    pub fn set_status(&self, status: TaskStatus) {
        self.status.store(status as u8, Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Default for DummyTask {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl Task for DummyTask {
    fn start(&self) {
        self.status.store(TaskStatus::Running as u8, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.status
            .store(TaskStatus::Cancelled as u8, Ordering::SeqCst);
    }

    fn pause(&self) {
        self.status.store(TaskStatus::Paused as u8, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.status
            .store(TaskStatus::Running as u8, Ordering::SeqCst);
    }

    fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    fn progress(&self) -> f64 {
        0.0
    }
}
