//! Mutex-protected task queue for longer-lived work.
//!
//! Same five-lane priority layout as [`super::behavior_queue`], but holding
//! owning task handles and supporting removal by id, which a lock-free ring
//! cannot do cheaply. Guarded by a single short-held `parking_lot::Mutex`,
//! matching the mutex usage in the donor's communication hub.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::arbiter::task::Task;
use crate::priority::Priority;

#[derive(Clone)]
pub struct TaskHandle {
    pub task_id: String,
    pub priority: Priority,
    pub task: Arc<dyn Task>,
}

struct Inner {
    lanes: [VecDeque<TaskHandle>; Priority::COUNT],
    /// task_id -> lane, for O(1) removal and duplicate rejection.
    locations: HashMap<String, Priority>,
}

pub struct TaskQueue {
    inner: Mutex<Inner>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                lanes: std::array::from_fn(|_| VecDeque::new()),
                locations: HashMap::new(),
            }),
        }
    }

    /// Enqueue `handle`. Returns `false` if `task_id` is already queued in
    /// any lane.
    pub fn enqueue(&self, handle: TaskHandle) -> bool {
        let mut inner = self.inner.lock();
        if inner.locations.contains_key(&handle.task_id) {
            return false;
        }
        inner
            .locations
            .insert(handle.task_id.clone(), handle.priority);
        inner.lanes[handle.priority.lane()].push_back(handle);
        true
    }

    /// Dequeue the oldest handle from the highest-priority non-empty lane.
    pub fn dequeue(&self) -> Option<TaskHandle> {
        let mut inner = self.inner.lock();
        for priority in Priority::ALL {
            if let Some(handle) = inner.lanes[priority.lane()].pop_front() {
                inner.locations.remove(&handle.task_id);
                return Some(handle);
            }
        }
        None
    }

    /// Remove a specific task by id regardless of which lane it sits in.
    pub fn remove(&self, task_id: &str) -> Option<TaskHandle> {
        let mut inner = self.inner.lock();
        let priority = inner.locations.remove(task_id)?;
        let lane = &mut inner.lanes[priority.lane()];
        let pos = lane.iter().position(|h| h.task_id == task_id)?;
        lane.remove(pos)
    }

    /// Peek the handle that `dequeue` would return next, without removing
    /// it.
    pub fn peek(&self) -> Option<TaskHandle> {
        let inner = self.inner.lock();
        for priority in Priority::ALL {
            if let Some(handle) = inner.lanes[priority.lane()].front() {
                return Some(handle.clone());
            }
        }
        None
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for lane in inner.lanes.iter_mut() {
            lane.clear();
        }
        inner.locations.clear();
    }

    /// Priority-ordered, FIFO-within-priority snapshot of every queued
    /// task.
    pub fn get_all_tasks(&self) -> Vec<TaskHandle> {
        let inner = self.inner.lock();
        let mut out = Vec::with_capacity(inner.locations.len());
        for priority in Priority::ALL {
            out.extend(inner.lanes[priority.lane()].iter().cloned());
        }
        out
    }

    pub fn len(&self) -> usize {
        self.inner.lock().locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::task::DummyTask;

    fn handle(id: &str, priority: Priority) -> TaskHandle {
        TaskHandle {
            task_id: id.to_string(),
            priority,
            task: Arc::new(DummyTask::new()),
        }
    }

    #[test]
    fn duplicate_task_id_rejected() {
        let q = TaskQueue::new();
        assert!(q.enqueue(handle("t1", Priority::NormalTask)));
        assert!(!q.enqueue(handle("t1", Priority::UrgentTask)));
    }

    #[test]
    fn strict_priority_with_fifo() {
        let q = TaskQueue::new();
        q.enqueue(handle("n1", Priority::NormalTask));
        q.enqueue(handle("u1", Priority::UrgentTask));
        q.enqueue(handle("n2", Priority::NormalTask));

        assert_eq!(q.dequeue().unwrap().task_id, "u1");
        assert_eq!(q.dequeue().unwrap().task_id, "n1");
        assert_eq!(q.dequeue().unwrap().task_id, "n2");
    }

    #[test]
    fn remove_by_id() {
        let q = TaskQueue::new();
        q.enqueue(handle("a", Priority::NormalTask));
        q.enqueue(handle("b", Priority::NormalTask));
        let removed = q.remove("a").unwrap();
        assert_eq!(removed.task_id, "a");
        assert_eq!(q.len(), 1);
        assert_eq!(q.dequeue().unwrap().task_id, "b");
    }
}
