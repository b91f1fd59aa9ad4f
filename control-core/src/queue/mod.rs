//! Priority queues feeding the behavior arbiter.

mod behavior_queue;
mod task_queue;

pub use behavior_queue::BehaviorPriorityQueue;
pub use task_queue::{TaskHandle, TaskQueue};
