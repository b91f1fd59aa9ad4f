//! W3C Trace Context: ids, the `TraceContext` carrier, and
//! `traceparent`/`tracestate`/`baggage` header (de)serialization.
//!
//! Grounded on the donor's `SpanContext.h`/`SpanContext.cpp`
//! (`SpanContextUtils`, `extractTraceContext`/`injectTraceContext`).
//! Id generation trades the donor's thread-local `mt19937_64` for a
//! thread-local xorshift64* generator - no `uuid` dependency needed for
//! a format that is just 16 or 8 random bytes as hex.

use std::cell::Cell;
use std::collections::HashMap;

use crate::error::TraceError;

pub const TRACEPARENT_HEADER: &str = "traceparent";
pub const TRACESTATE_HEADER: &str = "tracestate";
pub const BAGGAGE_HEADER: &str = "baggage";

const TRACE_FLAG_SAMPLED: u8 = 0x01;

thread_local! {
    static RNG_STATE: Cell<u64> = Cell::new(seed());
}

fn seed() -> u64 {
    let addr = &RNG_STATE as *const _ as u64;
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    (addr ^ time) | 1
}

fn next_random_u64() -> u64 {
    RNG_STATE.with(|cell| {
        let mut x = cell.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        cell.set(x);
        x
    })
}

/// A W3C Trace Context, propagated alongside any call that crosses a
/// process or thread boundary the tracer cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: String,
    pub trace_flags: u8,
    pub trace_state: String,
    pub baggage: HashMap<String, String>,
    pub is_remote: bool,
}

impl TraceContext {
    pub fn invalid() -> Self {
        Self {
            trace_id: String::new(),
            span_id: String::new(),
            parent_span_id: String::new(),
            trace_flags: 0,
            trace_state: String::new(),
            baggage: HashMap::new(),
            is_remote: false,
        }
    }

    /// A fresh root context with newly generated ids, sampled per `sampled`.
    pub fn new_root(sampled: bool) -> Self {
        Self {
            trace_id: generate_trace_id(),
            span_id: generate_span_id(),
            parent_span_id: String::new(),
            trace_flags: if sampled { TRACE_FLAG_SAMPLED } else { 0 },
            trace_state: String::new(),
            baggage: HashMap::new(),
            is_remote: false,
        }
    }

    /// A child context of `self`: same trace id, new span id, this
    /// context's span id becomes the parent.
    pub fn new_child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: generate_span_id(),
            parent_span_id: self.span_id.clone(),
            trace_flags: self.trace_flags,
            trace_state: self.trace_state.clone(),
            baggage: self.baggage.clone(),
            is_remote: false,
        }
    }

    pub fn is_sampled(&self) -> bool {
        self.trace_flags & TRACE_FLAG_SAMPLED != 0
    }

    pub fn is_valid(&self) -> bool {
        is_valid_trace_id(&self.trace_id) && is_valid_span_id(&self.span_id)
    }
}

/// Uniform random value in `[0, 1)`, used by the RT-cycle tracer's
/// sampling decision.
pub(crate) fn random_unit() -> f64 {
    (next_random_u64() >> 11) as f64 / (1u64 << 53) as f64
}

pub fn generate_trace_id() -> String {
    format!("{:016x}{:016x}", next_random_u64(), next_random_u64())
}

pub fn generate_span_id() -> String {
    format!("{:016x}", next_random_u64())
}

pub fn is_valid_trace_id(trace_id: &str) -> bool {
    trace_id.len() == 32 && trace_id.chars().all(|c| c.is_ascii_hexdigit()) && trace_id != "0".repeat(32)
}

pub fn is_valid_span_id(span_id: &str) -> bool {
    span_id.len() == 16 && span_id.chars().all(|c| c.is_ascii_hexdigit()) && span_id != "0".repeat(16)
}

/// Parse a `traceparent` header of the form `00-{trace_id}-{span_id}-{flags}`.
pub fn parse_traceparent(traceparent: &str) -> Result<TraceContext, TraceError> {
    let parts: Vec<&str> = traceparent.split('-').collect();
    if parts.len() != 4 {
        return Err(TraceError::InvalidTraceparent(traceparent.to_string()));
    }
    let (version, trace_id, span_id, flags) = (parts[0], parts[1], parts[2], parts[3]);
    if version != "00" {
        return Err(TraceError::InvalidTraceparent(traceparent.to_string()));
    }
    if !is_valid_trace_id(trace_id) {
        return Err(TraceError::InvalidTraceId);
    }
    if !is_valid_span_id(span_id) {
        return Err(TraceError::InvalidSpanId);
    }
    let trace_flags = u8::from_str_radix(flags, 16).map_err(|_| TraceError::InvalidTraceparent(traceparent.to_string()))?;

    Ok(TraceContext {
        trace_id: trace_id.to_string(),
        span_id: span_id.to_string(),
        parent_span_id: String::new(),
        trace_flags,
        trace_state: String::new(),
        baggage: HashMap::new(),
        is_remote: true,
    })
}

pub fn format_traceparent(context: &TraceContext) -> String {
    format!("00-{}-{}-{:02x}", context.trace_id, context.span_id, context.trace_flags)
}

pub fn parse_baggage(baggage: &str) -> HashMap<String, String> {
    parse_kv_pairs(baggage)
}

pub fn format_baggage(baggage: &HashMap<String, String>) -> String {
    format_kv_pairs(baggage)
}

fn parse_kv_pairs(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            let (k, v) = pair.split_once('=')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

fn format_kv_pairs(map: &HashMap<String, String>) -> String {
    let mut entries: Vec<(&String, &String)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Extract a [`TraceContext`] from a W3C header carrier. Missing or
/// invalid headers yield [`TraceContext::invalid`]; the carrier's
/// `tracestate` is carried through verbatim even when `traceparent`
/// parses successfully.
pub fn extract_context(carrier: &HashMap<String, String>) -> TraceContext {
    let Some(traceparent) = carrier.get(TRACEPARENT_HEADER) else {
        return TraceContext::invalid();
    };
    let Ok(mut context) = parse_traceparent(traceparent) else {
        return TraceContext::invalid();
    };
    if let Some(tracestate) = carrier.get(TRACESTATE_HEADER) {
        context.trace_state = tracestate.clone();
    }
    if let Some(baggage) = carrier.get(BAGGAGE_HEADER) {
        context.baggage = parse_baggage(baggage);
    }
    context
}

/// Inject `context` into `carrier` as W3C headers. Invalid contexts are
/// not injected, matching the donor's behavior.
pub fn inject_context(context: &TraceContext, carrier: &mut HashMap<String, String>) {
    if !context.is_valid() {
        return;
    }
    carrier.insert(TRACEPARENT_HEADER.to_string(), format_traceparent(context));
    if !context.trace_state.is_empty() {
        carrier.insert(TRACESTATE_HEADER.to_string(), context.trace_state.clone());
    }
    if !context.baggage.is_empty() {
        carrier.insert(BAGGAGE_HEADER.to_string(), format_baggage(&context.baggage));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid() {
        let trace_id = generate_trace_id();
        let span_id = generate_span_id();
        assert!(is_valid_trace_id(&trace_id));
        assert!(is_valid_span_id(&span_id));
    }

    #[test]
    fn traceparent_round_trips() {
        let ctx = TraceContext::new_root(true);
        let header = format_traceparent(&ctx);
        let parsed = parse_traceparent(&header).unwrap();
        assert_eq!(parsed.trace_id, ctx.trace_id);
        assert_eq!(parsed.span_id, ctx.span_id);
        assert_eq!(parsed.trace_flags, ctx.trace_flags);
    }

    #[test]
    fn rejects_malformed_traceparent() {
        assert!(parse_traceparent("not-a-traceparent").is_err());
        assert!(matches!(
            parse_traceparent("01-0000000000000000000000000000ff-00000000000000ff-01"),
            Err(TraceError::InvalidTraceparent(_))
        ));
        assert!(matches!(
            parse_traceparent(&format!("00-{}-00000000000000ff-01", "0".repeat(32))),
            Err(TraceError::InvalidTraceId)
        ));
    }

    #[test]
    fn baggage_round_trips_sorted() {
        let mut baggage = HashMap::new();
        baggage.insert("b".to_string(), "2".to_string());
        baggage.insert("a".to_string(), "1".to_string());
        let formatted = format_baggage(&baggage);
        assert_eq!(formatted, "a=1,b=2");
        assert_eq!(parse_baggage(&formatted), baggage);
    }

    #[test]
    fn extract_falls_back_to_invalid_without_traceparent() {
        let carrier = HashMap::new();
        let ctx = extract_context(&carrier);
        assert!(!ctx.is_valid());
    }

    #[test]
    fn inject_skips_invalid_context() {
        let mut carrier = HashMap::new();
        inject_context(&TraceContext::invalid(), &mut carrier);
        assert!(carrier.is_empty());
    }

    #[test]
    fn child_context_keeps_trace_id_links_parent() {
        let root = TraceContext::new_root(true);
        let child = root.new_child();
        assert_eq!(child.trace_id, root.trace_id);
        assert_eq!(child.parent_span_id, root.span_id);
        assert_ne!(child.span_id, root.span_id);
    }
}
