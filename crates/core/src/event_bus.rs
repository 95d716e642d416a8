//! Unified event bus: trait for emitting funnel analytics events from any module.
//!
//! Modules accept an `Arc<dyn EventSink>` to emit events into the tracking
//! collector (the quiz-flow store, or the remote collector in the browser
//! build). Emission is fire-and-forget: sinks never report failure back.

use crate::types::{AnalyticsEvent, EventType, QuizCategory};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// Trait for emitting analytics events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AnalyticsEvent);
}

/// No-op sink for tests and modules that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: AnalyticsEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_type(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    /// Event types in emission order.
    pub fn types(&self) -> Vec<EventType> {
        self.events
            .lock()
            .iter()
            .map(|e| e.event_type)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: AnalyticsEvent) {
        self.events.lock().push(event);
    }
}

/// Convenience builder for creating `AnalyticsEvent` with minimal boilerplate.
pub fn make_event(
    event_type: EventType,
    session_id: impl Into<String>,
    step_number: u32,
    timestamp: DateTime<Utc>,
) -> AnalyticsEvent {
    AnalyticsEvent {
        event_id: Uuid::new_v4(),
        session_id: session_id.into(),
        event_type,
        step_number,
        time_spent_seconds: None,
        category: None,
        metadata: serde_json::Value::Null,
        timestamp,
    }
}

impl AnalyticsEvent {
    pub fn with_time_spent(mut self, seconds: u64) -> Self {
        self.time_spent_seconds = Some(seconds);
        self
    }

    pub fn with_category(mut self, category: Option<QuizCategory>) -> Self {
        self.category = category;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Convenience: create a no-op event bus for modules that don't need it.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        assert_eq!(sink.count(), 0);

        sink.emit(make_event(EventType::StepEntered, "sess-1", 1, Utc::now()));
        sink.emit(
            make_event(EventType::StepExited, "sess-1", 1, Utc::now())
                .with_time_spent(16)
                .with_metadata(serde_json::json!({"reason": "timer"})),
        );

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.count_type(EventType::StepEntered), 1);
        assert_eq!(sink.count_type(EventType::StepExited), 1);

        let events = sink.events();
        assert_eq!(events[0].session_id, "sess-1");
        assert_eq!(events[1].time_spent_seconds, Some(16));
        assert_eq!(sink.types(), vec![EventType::StepEntered, EventType::StepExited]);
    }

    #[test]
    fn test_noop_sink() {
        let sink = noop_sink();
        // Should not panic
        sink.emit(make_event(EventType::PageHidden, "sess-1", 3, Utc::now()));
    }
}
