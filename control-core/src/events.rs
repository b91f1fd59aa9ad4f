//! Event DTO and publish/subscribe boundary the core depends on but does
//! not implement: DataStore and EventBus are external collaborators
//! (concrete message buses, in-memory fan-out, whatever the deployment
//! wires up).
//!
//! Grounded on the donor's `IEvent`/`EventBusTracer` (`EventBusTracer.cpp`):
//! the source event DTO has no metadata storage, so its tracer correlates
//! publish/dispatch spans through a thread-local map keyed by event id
//! instead of carrying the trace context on the event itself. This core
//! adds the metadata slot the source lacks so a `traceparent` can travel
//! with the event proper.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One event flowing through an [`EventBus`]. `metadata` carries
/// cross-cutting context - most notably `traceparent` - so the
/// dispatch-side tracer can parent its span to the publish-side span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub type_name: String,
    pub target_id: String,
    pub payload: JsonValue,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_id: impl Into<String>, type_name: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            type_name: type_name.into(),
            target_id: target_id.into(),
            payload: JsonValue::Null,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload = payload;
        self
    }

    /// Attach a W3C `traceparent` so the receiving side can link its
    /// dispatch span to the span that published this event.
    pub fn with_traceparent(mut self, traceparent: impl Into<String>) -> Self {
        self.metadata.insert("traceparent".to_string(), traceparent.into());
        self
    }

    pub fn traceparent(&self) -> Option<&str> {
        self.metadata.get("traceparent").map(String::as_str)
    }
}

/// Subscriber callback invoked by [`EventBus::publish`] for each matching
/// subscription.
pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// Publish/subscribe boundary the alarm engine writes through
/// (`alarm.raised`/`alarm.cleared`); nothing in the core reads it
/// synchronously in the hot path (§5). A real deployment backs this
/// with a network or shared-memory bus; the core only depends on this
/// trait.
pub trait EventBus: Send + Sync {
    fn publish(&self, topic: &str, event: Event);
    fn subscribe(&self, topic: &str, subscriber: std::sync::Arc<dyn EventSubscriber>);
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// In-process fan-out bus for unit tests: synchronous, unbounded,
    /// no ordering guarantees across topics.
    #[derive(Default)]
    pub struct InMemoryEventBus {
        subscribers: Mutex<HashMap<String, Vec<Arc<dyn EventSubscriber>>>>,
        published: Mutex<Vec<(String, Event)>>,
    }

    impl InMemoryEventBus {
        pub fn published(&self) -> Vec<(String, Event)> {
            self.published.lock().clone()
        }
    }

    impl EventBus for InMemoryEventBus {
        fn publish(&self, topic: &str, event: Event) {
            self.published.lock().push((topic.to_string(), event.clone()));
            if let Some(subs) = self.subscribers.lock().get(topic) {
                for sub in subs {
                    sub.on_event(&event);
                }
            }
        }

        fn subscribe(&self, topic: &str, subscriber: Arc<dyn EventSubscriber>) {
            self.subscribers.lock().entry(topic.to_string()).or_default().push(subscriber);
        }
    }
}
