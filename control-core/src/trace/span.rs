//! A single unit of traced work: start/end time, status, attributes,
//! and time-stamped events.
//!
//! Grounded on the donor's `ISpan`/`SpanGuard` (`TracerProvider.h`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::trace::context::TraceContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStatus {
    Unset,
    Ok,
    Error,
}

impl SpanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SpanStatus::Unset => "UNSET",
            SpanStatus::Ok => "OK",
            SpanStatus::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub attributes: HashMap<String, String>,
}

struct SpanInner {
    status: SpanStatus,
    status_message: String,
    attributes: HashMap<String, String>,
    events: Vec<SpanEvent>,
    end_time: Option<DateTime<Utc>>,
}

/// A span in progress or finished. Cheaply cloned (`Arc`-backed);
/// `end()` is idempotent the same way the donor's `SpanGuard` requires.
pub struct Span {
    operation_name: String,
    context: TraceContext,
    start_time: DateTime<Utc>,
    recording: AtomicBool,
    inner: Mutex<SpanInner>,
}

impl Span {
    pub fn start(operation_name: impl Into<String>, context: TraceContext) -> Self {
        Self {
            operation_name: operation_name.into(),
            context,
            start_time: Utc::now(),
            recording: AtomicBool::new(true),
            inner: Mutex::new(SpanInner {
                status: SpanStatus::Unset,
                status_message: String::new(),
                attributes: HashMap::new(),
                events: Vec::new(),
                end_time: None,
            }),
        }
    }

    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().end_time
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn set_status(&self, status: SpanStatus, message: impl Into<String>) {
        if !self.is_recording() {
            return;
        }
        let mut inner = self.inner.lock();
        inner.status = status;
        inner.status_message = message.into();
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<String>) {
        if !self.is_recording() {
            return;
        }
        self.inner.lock().attributes.insert(key.into(), value.into());
    }

    pub fn add_event(&self, name: impl Into<String>, attributes: HashMap<String, String>) {
        if !self.is_recording() {
            return;
        }
        self.inner.lock().events.push(SpanEvent {
            name: name.into(),
            timestamp: Utc::now(),
            attributes,
        });
    }

    pub fn status(&self) -> SpanStatus {
        self.inner.lock().status
    }

    pub fn events(&self) -> Vec<SpanEvent> {
        self.inner.lock().events.clone()
    }

    pub fn attributes(&self) -> HashMap<String, String> {
        self.inner.lock().attributes.clone()
    }

    /// End the span. Idempotent: subsequent calls are no-ops.
    pub fn end(&self) {
        if self.recording.swap(false, Ordering::AcqRel) {
            self.inner.lock().end_time = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_is_idempotent() {
        let span = Span::start("op", TraceContext::new_root(true));
        span.end();
        let first_end = span.end_time();
        span.end();
        assert_eq!(span.end_time(), first_end);
        assert!(!span.is_recording());
    }

    #[test]
    fn attributes_and_events_accumulate() {
        let span = Span::start("op", TraceContext::new_root(true));
        span.set_attribute("robot_id", "r1");
        span.add_event("jitter", HashMap::from([("value_us".to_string(), "1500".to_string())]));
        assert_eq!(span.attributes().get("robot_id").map(String::as_str), Some("r1"));
        assert_eq!(span.events().len(), 1);
    }

    #[test]
    fn mutations_after_end_are_ignored() {
        let span = Span::start("op", TraceContext::new_root(true));
        span.end();
        span.set_attribute("late", "value");
        span.add_event("late_event", HashMap::new());
        assert!(span.attributes().is_empty());
        assert!(span.events().is_empty());
    }

    #[test]
    fn status_defaults_to_unset() {
        let span = Span::start("op", TraceContext::new_root(true));
        assert_eq!(span.status(), SpanStatus::Unset);
        span.set_status(SpanStatus::Error, "boom");
        assert_eq!(span.status(), SpanStatus::Error);
    }
}
