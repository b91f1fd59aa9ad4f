//! Tracing core: W3C trace context propagation, span creation, and a
//! sampled real-time-cycle tracer.

mod context;
mod rt_cycle;
mod span;
mod tracer;

pub use context::{
    extract_context, format_baggage, format_traceparent, generate_span_id, generate_trace_id, inject_context,
    is_valid_span_id, is_valid_trace_id, parse_baggage, parse_traceparent, TraceContext, BAGGAGE_HEADER,
    TRACEPARENT_HEADER, TRACESTATE_HEADER,
};
pub use rt_cycle::{RTCycleGuard, RTCycleStats, RTCycleTracer};
pub use span::{Span, SpanEvent, SpanStatus};
pub use tracer::{Tracer, TracerProvider};
