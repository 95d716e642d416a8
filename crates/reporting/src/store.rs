//! In-memory quiz-flow tables.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use testograph_core::event_bus::EventSink;
use testograph_core::types::{AnalyticsEvent, QuizCategory};
use tracing::debug;
use uuid::Uuid;

use crate::models::{EventSource, PendingOrder, QuizCompletion, QuizStepEvent};

/// Rows visible to one report: created at or after `since`, and in
/// `category` when one is given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub since: DateTime<Utc>,
    pub category: Option<QuizCategory>,
}

impl Window {
    pub fn new(since: DateTime<Utc>, category: Option<QuizCategory>) -> Self {
        Self { since, category }
    }

    fn admits(&self, at: DateTime<Utc>, category: Option<QuizCategory>) -> bool {
        at >= self.since && self.category.map_or(true, |c| category == Some(c))
    }
}

pub struct QuizFlowStore {
    completions: DashMap<Uuid, QuizCompletion>,
    step_events: DashMap<Uuid, QuizStepEvent>,
    orders: DashMap<Uuid, PendingOrder>,
}

impl QuizFlowStore {
    pub fn new() -> Self {
        Self {
            completions: DashMap::new(),
            step_events: DashMap::new(),
            orders: DashMap::new(),
        }
    }

    pub fn insert_completion(&self, completion: QuizCompletion) {
        self.completions.insert(completion.id, completion);
    }

    pub fn insert_step_event(&self, event: QuizStepEvent) {
        self.step_events.insert(event.id, event);
    }

    pub fn insert_order(&self, order: PendingOrder) {
        self.orders.insert(order.id, order);
    }

    /// Store a tracked event as a step-event row.
    pub fn record(&self, event: AnalyticsEvent, source: EventSource) {
        debug!(
            session_id = %event.session_id,
            event_type = %event.event_type,
            step = event.step_number,
            source = %source,
            "Step event recorded"
        );
        self.insert_step_event(QuizStepEvent::from_event(event, source));
    }

    pub fn completion_count(&self) -> usize {
        self.completions.len()
    }

    pub fn step_event_count(&self) -> usize {
        self.step_events.len()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Completions in the window, newest first.
    pub fn completions(&self, window: &Window) -> Vec<QuizCompletion> {
        let mut rows: Vec<_> = self
            .completions
            .iter()
            .filter(|c| window.admits(c.created_at, Some(c.category)))
            .map(|c| c.value().clone())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.session_id.cmp(&b.session_id)));
        rows
    }

    /// Step events from one source in the window, oldest first.
    pub fn step_events(&self, window: &Window, source: EventSource) -> Vec<QuizStepEvent> {
        let mut rows: Vec<_> = self
            .step_events
            .iter()
            .filter(|e| e.source == source && window.admits(e.created_at, e.category))
            .map(|e| e.value().clone())
            .collect();
        sort_events(&mut rows);
        rows
    }

    /// Orders in the window, newest first. Orders carry an optional category;
    /// uncategorised orders only show up in unfiltered reports.
    pub fn orders(&self, window: &Window) -> Vec<PendingOrder> {
        let mut rows: Vec<_> = self
            .orders
            .iter()
            .filter(|o| window.admits(o.created_at, o.category))
            .map(|o| o.value().clone())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    /// Every step event for one session across sources, oldest first.
    pub fn session_events(&self, session_id: &str) -> Vec<QuizStepEvent> {
        let mut rows: Vec<_> = self
            .step_events
            .iter()
            .filter(|e| e.session_id == session_id)
            .map(|e| e.value().clone())
            .collect();
        sort_events(&mut rows);
        rows
    }

    pub fn session_completion(&self, session_id: &str) -> Option<QuizCompletion> {
        self.completions
            .iter()
            .filter(|c| c.session_id == session_id)
            .max_by_key(|c| c.created_at)
            .map(|c| c.value().clone())
    }

    pub fn session_orders(&self, session_id: &str) -> Vec<PendingOrder> {
        let mut rows: Vec<_> = self
            .orders
            .iter()
            .filter(|o| o.session_id.as_deref() == Some(session_id))
            .map(|o| o.value().clone())
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        rows
    }

    /// Latest order per email, used to join orders onto completions.
    pub fn latest_orders_by_email(&self) -> BTreeMap<String, PendingOrder> {
        let mut by_email: BTreeMap<String, PendingOrder> = BTreeMap::new();
        for order in self.orders.iter() {
            let key = order.email.to_lowercase();
            let newer = by_email.get(&key).map_or(true, |o| order.created_at > o.created_at);
            if newer {
                by_email.insert(key, order.value().clone());
            }
        }
        by_email
    }
}

impl Default for QuizFlowStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The in-process funnel writes straight into the store.
impl EventSink for QuizFlowStore {
    fn emit(&self, event: AnalyticsEvent) {
        self.record(event, EventSource::Funnel);
    }
}

fn sort_events(rows: &mut [QuizStepEvent]) {
    rows.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.step_number.cmp(&b.step_number))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use testograph_core::event_bus::make_event;
    use testograph_core::types::EventType;

    fn completion(session: &str, category: QuizCategory, at: DateTime<Utc>) -> QuizCompletion {
        QuizCompletion {
            id: Uuid::new_v4(),
            session_id: session.into(),
            category,
            first_name: None,
            email: Some(format!("{session}@example.com")),
            phone: None,
            age: None,
            total_score: 50,
            level: "moderate".into(),
            created_at: at,
        }
    }

    #[test]
    fn test_window_filters_by_time_and_category() {
        let store = QuizFlowStore::new();
        let now = Utc::now();
        store.insert_completion(completion("a", QuizCategory::Energy, now));
        store.insert_completion(completion("b", QuizCategory::Libido, now - Duration::hours(1)));
        store.insert_completion(completion("c", QuizCategory::Energy, now - Duration::days(10)));

        let week = Window::new(now - Duration::days(7), None);
        let rows = store.completions(&week);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].session_id, "a");

        let energy = Window::new(now - Duration::days(30), Some(QuizCategory::Energy));
        assert_eq!(store.completions(&energy).len(), 2);
    }

    #[test]
    fn test_sink_records_funnel_events() {
        let store = Arc::new(QuizFlowStore::new());
        let sink: Arc<dyn EventSink> = store.clone();
        let now = Utc::now();
        sink.emit(make_event(EventType::StepEntered, "s1", 3, now));
        sink.emit(make_event(EventType::StepEntered, "s1", 2, now - Duration::seconds(5)));

        let window = Window::new(now - Duration::days(1), None);
        assert!(store.step_events(&window, EventSource::Quiz).is_empty());
        let funnel = store.step_events(&window, EventSource::Funnel);
        assert_eq!(funnel.iter().map(|e| e.step_number).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(store.session_events("s1").len(), 2);
    }
}
