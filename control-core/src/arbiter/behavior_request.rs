//! Behavior requests: the unit of work submitted to the arbiter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::arbiter::task::Task;
use crate::priority::Priority;

/// A request to run `task` at `priority`. Equality is by `behavior_id`.
#[derive(Clone)]
pub struct BehaviorRequest {
    pub behavior_id: String,
    pub priority: Priority,
    pub task: Arc<dyn Task>,
    pub timestamp: Instant,
    pub requester_id: String,
    pub cancellable: bool,
    pub timeout: Option<Duration>,
}

impl PartialEq for BehaviorRequest {
    fn eq(&self, other: &Self) -> bool {
        self.behavior_id == other.behavior_id
    }
}
impl Eq for BehaviorRequest {}

impl BehaviorRequest {
    pub fn new(
        behavior_id: impl Into<String>,
        priority: Priority,
        task: Arc<dyn Task>,
        requester_id: impl Into<String>,
    ) -> Self {
        Self {
            behavior_id: behavior_id.into(),
            priority,
            task,
            timestamp: Instant::now(),
            requester_id: requester_id.into(),
            cancellable: true,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellable(mut self, cancellable: bool) -> Self {
        self.cancellable = cancellable;
        self
    }

    /// Whether this request has exceeded `timestamp + timeout` as of `now`.
    /// Requests without a timeout never expire.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.timeout {
            Some(timeout) => now.saturating_duration_since(self.timestamp) >= timeout,
            None => false,
        }
    }
}
