//! `POST /api/funnel/track`: analytics collector.
//!
//! Accepts one event or a batch and stores each as a step-event row. The
//! `source` query parameter says which flow sent them: `quiz` for the
//! questionnaire, `funnel` (the default) for the result funnel.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use testograph_core::types::AnalyticsEvent;
use testograph_core::TestographError;
use testograph_reporting::EventSource;
use tracing::debug;

use crate::rest::{api_error, ApiError, AppState};

/// Maximum events per batch.
const MAX_BATCH: usize = 500;

/// Maximum session id length.
const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TrackPayload {
    Batch(Vec<AnalyticsEvent>),
    Single(AnalyticsEvent),
}

impl TrackPayload {
    fn into_events(self) -> Vec<AnalyticsEvent> {
        match self {
            TrackPayload::Batch(events) => events,
            TrackPayload::Single(event) => vec![event],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TrackParams {
    pub source: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrackResponse {
    pub accepted: usize,
}

fn parse_source(raw: Option<&str>) -> Result<EventSource, TestographError> {
    match raw.map(str::trim) {
        None | Some("") | Some("funnel") => Ok(EventSource::Funnel),
        Some("quiz") => Ok(EventSource::Quiz),
        Some(other) => Err(TestographError::Validation(format!(
            "source must be 'quiz' or 'funnel', got '{other}'"
        ))),
    }
}

fn validate(events: &[AnalyticsEvent]) -> Result<(), TestographError> {
    if events.len() > MAX_BATCH {
        return Err(TestographError::Validation(format!(
            "batch exceeds {MAX_BATCH} events"
        )));
    }
    for event in events {
        if event.session_id.is_empty() || event.session_id.len() > MAX_SESSION_ID_LEN {
            return Err(TestographError::Validation(
                "event 'session_id' must be 1..=128 characters".into(),
            ));
        }
    }
    Ok(())
}

pub async fn track(
    State(state): State<AppState>,
    Query(params): Query<TrackParams>,
    Json(payload): Json<TrackPayload>,
) -> Result<Json<TrackResponse>, ApiError> {
    let source = parse_source(params.source.as_deref()).map_err(api_error)?;
    let events = payload.into_events();
    validate(&events).map_err(api_error)?;

    let accepted = events.len();
    let store = state.report.store();
    for event in events {
        store.record(event, source);
    }
    metrics::counter!("tracking.ingested", "source" => source.as_str()).increment(accepted as u64);
    debug!(accepted, source = %source, "Tracking batch stored");
    Ok(Json(TrackResponse { accepted }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_defaults_to_funnel() {
        assert_eq!(parse_source(None).unwrap(), EventSource::Funnel);
        assert_eq!(parse_source(Some("quiz")).unwrap(), EventSource::Quiz);
        assert!(parse_source(Some("ads")).is_err());
    }

    #[test]
    fn test_payload_accepts_single_or_batch() {
        let single = serde_json::json!({
            "event_id": "8f2b4c1e-2f0a-4a53-9a57-3f3c2f0d8a11",
            "session_id": "s1",
            "event_type": "step_entered",
            "step_number": 3,
            "timestamp": "2026-01-05T10:00:00Z"
        });
        let one: TrackPayload = serde_json::from_value(single.clone()).unwrap();
        assert_eq!(one.into_events().len(), 1);

        let many: TrackPayload = serde_json::from_value(serde_json::json!([single.clone(), single])).unwrap();
        assert_eq!(many.into_events().len(), 2);
    }
}
