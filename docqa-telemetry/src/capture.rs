//! In-memory event capture for tests.
//!
//! [`EventCapture`] is a `tracing_subscriber` [`Layer`] that records every
//! event with its level, target and fields. Clones share the same buffer, so
//! one handle can be installed in a subscriber while another is inspected.
//!
//! ```rust,ignore
//! use tracing_subscriber::layer::SubscriberExt;
//!
//! let capture = EventCapture::new();
//! let _guard = tracing::subscriber::set_default(
//!     tracing_subscriber::registry().with(capture.clone()),
//! );
//! // ... run code under test ...
//! assert!(!capture.with_field("query.state").is_empty());
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// One recorded event.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedEvent {
    pub level: String,
    pub target: String,
    /// The event's `message` field, if any.
    pub message: Option<String>,
    pub fields: HashMap<String, Value>,
}

impl CapturedEvent {
    /// The field as a string, whatever its recorded type.
    pub fn field_str(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// A layer that stores events in memory.
#[derive(Debug, Clone, Default)]
pub struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl EventCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event recorded so far.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Events that carry `field`.
    pub fn with_field(&self, field: &str) -> Vec<CapturedEvent> {
        self.events().into_iter().filter(|e| e.fields.contains_key(field)).collect()
    }

    /// Values of `field` across all events, in recording order.
    pub fn field_values(&self, field: &str) -> Vec<String> {
        self.events().iter().filter_map(|e| e.field_str(field)).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl<S> Layer<S> for EventCapture
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        let mut fields = visitor.0;
        let message = match fields.remove("message") {
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
            None => None,
        };

        let metadata = event.metadata();
        let captured = CapturedEvent {
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message,
            fields,
        };
        if let Ok(mut events) = self.events.lock() {
            events.push(captured);
        }
    }
}

#[derive(Default)]
struct JsonVisitor(HashMap<String, Value>);

impl Visit for JsonVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), Value::Bool(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    #[test]
    fn records_fields_and_message() {
        let capture = EventCapture::new();
        let subscriber = tracing_subscriber::registry().with(capture.clone());

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(chunk_id = "gst_0", attempt = 2u64, "retrying");
        });

        let events = capture.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, "WARN");
        assert_eq!(events[0].message.as_deref(), Some("retrying"));
        assert_eq!(events[0].field_str("chunk_id").as_deref(), Some("gst_0"));
        assert_eq!(events[0].fields["attempt"], Value::from(2u64));
    }

    #[tokio::test]
    async fn display_fields_are_strings() {
        let capture = EventCapture::new();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

        let state = "retrieving";
        tracing::debug!(query.state = %state, "query state changed");
        tracing::info!("no fields");

        assert_eq!(capture.field_values("query.state"), ["retrieving"]);
        assert_eq!(capture.with_field("query.state").len(), 1);
        capture.clear();
        assert!(capture.events().is_empty());
    }
}
