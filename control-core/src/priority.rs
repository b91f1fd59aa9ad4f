//! Behavior request priority levels.

use serde::{Deserialize, Serialize};

/// Five priority levels for behavior requests. Lower ordinal means higher
/// priority: `EmergencyStop` preempts everything, `Maintenance` preempts
/// nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Priority {
    EmergencyStop = 0,
    SafetyIssue = 1,
    UrgentTask = 2,
    NormalTask = 3,
    Maintenance = 4,
}

impl Priority {
    pub const COUNT: usize = 5;

    pub const ALL: [Priority; Priority::COUNT] = [
        Priority::EmergencyStop,
        Priority::SafetyIssue,
        Priority::UrgentTask,
        Priority::NormalTask,
        Priority::Maintenance,
    ];

    /// Index into the fixed-size lane arrays backing the priority queues.
    pub fn lane(self) -> usize {
        self as usize
    }

    /// Whether a request at this priority is allowed to preempt a running
    /// task (levels 0-2).
    pub fn can_preempt(self) -> bool {
        (self as u8) <= (Priority::UrgentTask as u8)
    }
}
