use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Analytics event sent to the tracking collector and stored as a
/// `quiz_step_events` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub event_id: Uuid,
    pub session_id: String,
    pub event_type: EventType,
    pub step_number: u32,
    #[serde(default)]
    pub time_spent_seconds: Option<u64>,
    #[serde(default)]
    pub category: Option<QuizCategory>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SessionStarted,
    StepEntered,
    StepExited,
    AnswerSelected,
    BackClicked,
    QuizAbandoned,
    PageHidden,
    SkipUsed,
    ButtonClick,
    ChoiceMade,
    ExitIntent,
    OfferTierChanged,
    OfferClicked,
    FunnelExit,
    QuizCompleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SessionStarted => "session_started",
            EventType::StepEntered => "step_entered",
            EventType::StepExited => "step_exited",
            EventType::AnswerSelected => "answer_selected",
            EventType::BackClicked => "back_clicked",
            EventType::QuizAbandoned => "quiz_abandoned",
            EventType::PageHidden => "page_hidden",
            EventType::SkipUsed => "skip_used",
            EventType::ButtonClick => "button_click",
            EventType::ChoiceMade => "choice_made",
            EventType::ExitIntent => "exit_intent",
            EventType::OfferTierChanged => "offer_tier_changed",
            EventType::OfferClicked => "offer_clicked",
            EventType::FunnelExit => "funnel_exit",
            EventType::QuizCompleted => "quiz_completed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quiz track a visitor was routed into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum QuizCategory {
    Energy,
    Libido,
    Muscle,
}

impl QuizCategory {
    pub const ALL: [QuizCategory; 3] = [QuizCategory::Energy, QuizCategory::Libido, QuizCategory::Muscle];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuizCategory::Energy => "energy",
            QuizCategory::Libido => "libido",
            QuizCategory::Muscle => "muscle",
        }
    }
}

impl fmt::Display for QuizCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuizCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "energy" => Ok(QuizCategory::Energy),
            "libido" => Ok(QuizCategory::Libido),
            "muscle" => Ok(QuizCategory::Muscle),
            other => Err(format!("unknown quiz category '{other}'")),
        }
    }
}
