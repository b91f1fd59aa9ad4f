//! Lock-free, five-lane priority queue feeding the behavior arbiter.
//!
//! Each priority level gets its own bounded MPSC ring buffer so that a
//! burst on one lane never contends with another. `crossbeam::queue::
//! ArrayQueue` is the lock-free bounded ring this wants; we lay five of
//! them out with `CachePadded` around the per-lane length counters to
//! avoid false sharing between lanes, the same way the CAS ring this was
//! ported from pads its write/read cursors to a cache line each.

use crossbeam::queue::ArrayQueue;
use crossbeam::utils::CachePadded;

use crate::arbiter::BehaviorRequest;
use crate::priority::Priority;

/// Consumer-only handle. `clear()` is only reachable through this type,
/// never through the producer-facing `Arc`-shared [`BehaviorQueueHandle`].
pub struct BehaviorPriorityQueue {
    lanes: [CachePadded<ArrayQueue<BehaviorRequest>>; Priority::COUNT],
}

impl BehaviorPriorityQueue {
    pub fn new(capacity_per_lane: usize) -> Self {
        Self {
            lanes: std::array::from_fn(|_| CachePadded::new(ArrayQueue::new(capacity_per_lane))),
        }
    }

    /// Push a request onto its lane. Returns the request back on failure
    /// (lane full) so the caller can count a drop without losing ownership
    /// implicitly.
    pub fn try_push(&self, request: BehaviorRequest) -> Result<(), BehaviorRequest> {
        let lane = request.priority.lane();
        self.lanes[lane].push(request)
    }

    /// Push a request back to the *front* of its own lane. Used when the
    /// arbiter pops a candidate that ends up not preempting: re-queuing at
    /// the back would lose FIFO fairness relative to requests that arrived
    /// after it but before the next tick.
    pub fn push_front(&self, request: BehaviorRequest) -> Result<(), BehaviorRequest> {
        let lane = request.priority.lane();
        let q = &self.lanes[lane];
        if q.is_full() {
            return Err(request);
        }
        let mut rest = Vec::with_capacity(q.len());
        while let Some(item) = q.pop() {
            rest.push(item);
        }
        // capacity was checked above, so this push cannot fail.
        let _ = q.push(request);
        for item in rest {
            let _ = q.push(item);
        }
        Ok(())
    }

    /// Pop the oldest request from the highest-priority non-empty lane.
    pub fn try_pop(&self) -> Option<BehaviorRequest> {
        for priority in Priority::ALL {
            if let Some(req) = self.lanes[priority.lane()].pop() {
                return Some(req);
            }
        }
        None
    }

    /// Approximate total size across all lanes.
    pub fn size(&self) -> usize {
        self.lanes.iter().map(|l| l.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(|l| l.is_empty())
    }

    /// Consumer-side only: drain every lane. Never expose this on a
    /// producer-shared handle (see module docs).
    pub fn clear(&self) {
        for lane in &self.lanes {
            while lane.pop().is_some() {}
        }
    }

    /// Drop every pending request whose `timestamp + timeout` has elapsed
    /// as of `now`, returning the count dropped. Implements the arbiter's
    /// per-tick timeout sweep.
    pub fn sweep_timeouts(&self, now: std::time::Instant) -> usize {
        let mut dropped = 0usize;
        for lane in &self.lanes {
            let mut kept = Vec::with_capacity(lane.len());
            while let Some(req) = lane.pop() {
                if req.is_expired(now) {
                    dropped += 1;
                } else {
                    kept.push(req);
                }
            }
            for req in kept {
                // Capacity cannot be exceeded: we only ever popped from
                // this lane above.
                let _ = lane.push(req);
            }
        }
        dropped
    }
}
