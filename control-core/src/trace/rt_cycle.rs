//! Sampled tracing for the real-time control loop: one span per
//! sampled cycle, with jitter/slack tagged as events.
//!
//! Grounded on the donor's `RTCycleTracer`/`RTCycleGuard`
//! (`RTCycleTracer.h`/`.cpp`). The not-sampled path never constructs a
//! [`Span`] or touches the heap beyond the thread-local cell read.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::trace::context::random_unit;
use crate::trace::span::{Span, SpanStatus};
use crate::trace::tracer::Tracer;

const JITTER_THRESHOLD_US: u64 = 1_000;
const SLACK_THRESHOLD_US: u64 = 1_000;

thread_local! {
    static CURRENT_CYCLE: RefCell<Option<Arc<Span>>> = const { RefCell::new(None) };
}

/// Traces real-time control cycles at a configurable sampling rate.
/// `start_cycle`/`end_cycle` bracket one iteration; `record_action` and
/// `record_timing` are cheap no-ops when the cycle was not sampled.
pub struct RTCycleTracer {
    tracer: Arc<Tracer>,
    enabled: AtomicBool,
    sampling_rate: Mutex<f64>,
    total_cycles: AtomicU64,
    sampled_cycles: AtomicU64,
}

impl RTCycleTracer {
    pub fn new(tracer: Arc<Tracer>, sampling_rate: f64) -> Self {
        Self {
            tracer,
            enabled: AtomicBool::new(true),
            sampling_rate: Mutex::new(sampling_rate.clamp(0.0, 1.0)),
            total_cycles: AtomicU64::new(0),
            sampled_cycles: AtomicU64::new(0),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_sampling_rate(&self, rate: f64) {
        *self.sampling_rate.lock() = rate.clamp(0.0, 1.0);
    }

    pub fn sampling_rate(&self) -> f64 {
        *self.sampling_rate.lock()
    }

    fn should_sample(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let rate = self.sampling_rate();
        if rate >= 1.0 {
            return true;
        }
        if rate <= 0.0 {
            return false;
        }
        random_unit() < rate
    }

    pub fn start_cycle(&self, cycle_number: u64) {
        self.total_cycles.fetch_add(1, Ordering::Relaxed);
        if !self.should_sample() {
            CURRENT_CYCLE.with(|cell| *cell.borrow_mut() = None);
            return;
        }
        self.sampled_cycles.fetch_add(1, Ordering::Relaxed);
        let mut attrs = HashMap::new();
        attrs.insert("cycle_number".to_string(), cycle_number.to_string());
        let span = self.tracer.start_span("rt_cycle", attrs);
        CURRENT_CYCLE.with(|cell| *cell.borrow_mut() = Some(span));
    }

    pub fn end_cycle(&self, success: bool) {
        let span = CURRENT_CYCLE.with(|cell| cell.borrow_mut().take());
        if let Some(span) = span {
            span.set_status(if success { SpanStatus::Ok } else { SpanStatus::Error }, "");
            span.end();
        }
    }

    pub fn record_action(&self, action_name: &str, duration_us: u64) {
        CURRENT_CYCLE.with(|cell| {
            if let Some(span) = cell.borrow().as_ref() {
                let mut attrs = HashMap::new();
                attrs.insert("duration_us".to_string(), duration_us.to_string());
                span.add_event(action_name.to_string(), attrs);
            }
        });
    }

    pub fn record_timing(&self, schedule_time_us: u64, actual_time_us: u64, deadline_us: u64) {
        CURRENT_CYCLE.with(|cell| {
            let borrowed = cell.borrow();
            let Some(span) = borrowed.as_ref() else { return };
            span.set_attribute("schedule_time_us", schedule_time_us.to_string());
            span.set_attribute("actual_time_us", actual_time_us.to_string());
            span.set_attribute("deadline_us", deadline_us.to_string());

            let jitter_us = actual_time_us.saturating_sub(schedule_time_us);
            if jitter_us > JITTER_THRESHOLD_US {
                let mut attrs = HashMap::new();
                attrs.insert("jitter_us".to_string(), jitter_us.to_string());
                span.add_event("high_jitter", attrs);
            }

            let slack_us = deadline_us.saturating_sub(actual_time_us);
            if slack_us < SLACK_THRESHOLD_US {
                let mut attrs = HashMap::new();
                attrs.insert("slack_us".to_string(), slack_us.to_string());
                span.add_event("low_slack", attrs);
            }
        });
    }

    pub fn stats(&self) -> RTCycleStats {
        RTCycleStats {
            total_cycles: self.total_cycles.load(Ordering::Relaxed),
            sampled_cycles: self.sampled_cycles.load(Ordering::Relaxed),
            sampling_rate: self.sampling_rate(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RTCycleStats {
    pub total_cycles: u64,
    pub sampled_cycles: u64,
    pub sampling_rate: f64,
}

/// RAII guard mirroring the donor's `RTCycleGuard`: starts the cycle on
/// construction, ends it (as a success) on drop.
pub struct RTCycleGuard<'a> {
    tracer: &'a RTCycleTracer,
}

impl<'a> RTCycleGuard<'a> {
    pub fn new(tracer: &'a RTCycleTracer, cycle_number: u64) -> Self {
        tracer.start_cycle(cycle_number);
        Self { tracer }
    }

    pub fn record_action(&self, action_name: &str, duration_us: u64) {
        self.tracer.record_action(action_name, duration_us);
    }
}

impl Drop for RTCycleGuard<'_> {
    fn drop(&mut self) {
        self.tracer.end_cycle(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_rate_one_always_samples() {
        let tracer = RTCycleTracer::new(Arc::new(Tracer::new("mxrc-rt")), 1.0);
        for n in 0..20 {
            tracer.start_cycle(n);
            tracer.end_cycle(true);
        }
        let stats = tracer.stats();
        assert_eq!(stats.total_cycles, 20);
        assert_eq!(stats.sampled_cycles, 20);
    }

    #[test]
    fn sampling_rate_zero_never_samples() {
        let tracer = RTCycleTracer::new(Arc::new(Tracer::new("mxrc-rt")), 0.0);
        for n in 0..20 {
            tracer.start_cycle(n);
            tracer.record_action("noop", 10);
            tracer.end_cycle(true);
        }
        let stats = tracer.stats();
        assert_eq!(stats.total_cycles, 20);
        assert_eq!(stats.sampled_cycles, 0);
    }

    #[test]
    fn disabled_tracer_never_samples_regardless_of_rate() {
        let tracer = RTCycleTracer::new(Arc::new(Tracer::new("mxrc-rt")), 1.0);
        tracer.set_enabled(false);
        tracer.start_cycle(1);
        tracer.end_cycle(true);
        assert_eq!(tracer.stats().sampled_cycles, 0);
    }

    #[test]
    fn guard_ends_cycle_on_drop() {
        let tracer = RTCycleTracer::new(Arc::new(Tracer::new("mxrc-rt")), 1.0);
        {
            let guard = RTCycleGuard::new(&tracer, 7);
            guard.record_action("move", 500);
        }
        assert_eq!(tracer.stats().sampled_cycles, 1);
    }

    #[test]
    fn sampling_rate_is_clamped() {
        let tracer = RTCycleTracer::new(Arc::new(Tracer::new("mxrc-rt")), 5.0);
        assert_eq!(tracer.sampling_rate(), 1.0);
        tracer.set_sampling_rate(-2.0);
        assert_eq!(tracer.sampling_rate(), 0.0);
    }
}
