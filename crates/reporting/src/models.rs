//! Rows of the three reporting tables: `quiz_results_v2`, `quiz_step_events`
//! and `pending_orders`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use testograph_core::types::{AnalyticsEvent, EventType, QuizCategory};
use uuid::Uuid;

/// A finished quiz with the contact details the visitor left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizCompletion {
    pub id: Uuid,
    pub session_id: String,
    pub category: QuizCategory,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    pub total_score: u32,
    /// Result band shown to the visitor (`low`, `moderate`, `optimal`).
    pub level: String,
    pub created_at: DateTime<Utc>,
}

/// Which surface emitted a step event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// The 25-step questionnaire (steps 0..=24).
    #[default]
    Quiz,
    /// The eight result-funnel micro-steps.
    Funnel,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Quiz => "quiz",
            EventSource::Funnel => "funnel",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizStepEvent {
    pub id: Uuid,
    pub session_id: String,
    pub category: Option<QuizCategory>,
    pub source: EventSource,
    pub event_type: EventType,
    pub step_number: u32,
    pub time_spent_seconds: Option<u64>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl QuizStepEvent {
    pub fn from_event(event: AnalyticsEvent, source: EventSource) -> Self {
        Self {
            id: event.event_id,
            session_id: event.session_id,
            category: event.category,
            source,
            event_type: event.event_type,
            step_number: event.step_number,
            time_spent_seconds: event.time_spent_seconds,
            metadata: event.metadata,
            created_at: event.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Orders that count towards revenue.
    pub fn is_revenue(&self) -> bool {
        !matches!(self, OrderStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub id: Uuid,
    #[serde(default)]
    pub session_id: Option<String>,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub category: Option<QuizCategory>,
    /// Offer tier the order was placed for.
    pub tier: String,
    pub total: f64,
    pub currency: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}
