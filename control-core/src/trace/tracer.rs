//! Span creation and thread-local current-span nesting.
//!
//! Grounded on the donor's `ITracer`/`ITracerProvider` (`TracerProvider.h`,
//! `TracerProvider.cpp`).

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::trace::context::{extract_context, inject_context, TraceContext};
use crate::trace::span::Span;

thread_local! {
    static CURRENT_SPAN: RefCell<Option<Arc<Span>>> = const { RefCell::new(None) };
}

/// Creates spans for one named component (e.g. `"mxrc-rt"`). Spans
/// nest through thread-local current-span state, mirroring the
/// donor's `ITracer::startSpan`/`setCurrentSpan`.
pub struct Tracer {
    name: String,
}

impl Tracer {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root span if no current span is set on this thread, else a
    /// child of it.
    pub fn start_span(&self, operation_name: impl Into<String>, attributes: HashMap<String, String>) -> Arc<Span> {
        let context = match self.current_span() {
            Some(parent) => parent.context().new_child(),
            None => TraceContext::new_root(true),
        };
        self.start_span_with_context(operation_name, context, attributes)
    }

    /// Starts a span as a child of an explicit parent context, ignoring
    /// any thread-local current span.
    pub fn start_span_with_parent(
        &self,
        operation_name: impl Into<String>,
        parent_context: &TraceContext,
        attributes: HashMap<String, String>,
    ) -> Arc<Span> {
        self.start_span_with_context(operation_name, parent_context.new_child(), attributes)
    }

    fn start_span_with_context(
        &self,
        operation_name: impl Into<String>,
        context: TraceContext,
        attributes: HashMap<String, String>,
    ) -> Arc<Span> {
        let span = Arc::new(Span::start(operation_name, context));
        for (k, v) in attributes {
            span.set_attribute(k, v);
        }
        span
    }

    pub fn current_span(&self) -> Option<Arc<Span>> {
        CURRENT_SPAN.with(|cell| cell.borrow().clone())
    }

    pub fn set_current_span(&self, span: Option<Arc<Span>>) {
        CURRENT_SPAN.with(|cell| *cell.borrow_mut() = span);
    }

    pub fn extract_context(&self, carrier: &HashMap<String, String>) -> TraceContext {
        extract_context(carrier)
    }

    pub fn inject_context(&self, context: &TraceContext, carrier: &mut HashMap<String, String>) {
        inject_context(context, carrier)
    }
}

/// Owns named [`Tracer`]s. `shutdown`/`force_flush` are no-ops beyond
/// bookkeeping: spans here are in-process only, there is no exporter.
pub struct TracerProvider {
    tracers: Mutex<HashMap<String, Arc<Tracer>>>,
    shut_down: std::sync::atomic::AtomicBool,
}

impl Default for TracerProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TracerProvider {
    pub fn new() -> Self {
        Self {
            tracers: Mutex::new(HashMap::new()),
            shut_down: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn get_tracer(&self, name: &str) -> Arc<Tracer> {
        self.tracers
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Tracer::new(name)))
            .clone()
    }

    pub fn shutdown(&self) {
        self.shut_down.store(true, std::sync::atomic::Ordering::Release);
        log::info!("tracer provider shut down");
    }

    /// No pending exporter queue to flush in-process; always succeeds.
    pub fn force_flush(&self, _timeout_ms: u32) -> bool {
        true
    }
}
