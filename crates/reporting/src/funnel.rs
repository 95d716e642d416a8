//! Step funnels: the quiz drop-off curve per category, where abandoned
//! sessions stopped, and the result-funnel journey through the offers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use testograph_core::types::{EventType, QuizCategory};

use crate::models::{EventSource, QuizStepEvent};
use crate::query::ReportQuery;
use crate::sessions::{quiz_sessions, SessionOutcome};
use crate::store::{QuizFlowStore, Window};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStepRow {
    pub step: u32,
    pub sessions: usize,
    pub drop_rate: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunnelReport {
    pub funnel: BTreeMap<QuizCategory, Vec<FunnelStepRow>>,
}

/// Percentage of the previous step's sessions lost at this step, rounded.
/// Zero for the first step and whenever the previous step is empty.
pub fn drop_rate(prev: Option<usize>, count: usize) -> i64 {
    match prev {
        Some(prev) if prev > 0 => {
            let lost = prev as f64 - count as f64;
            (lost / prev as f64 * 100.0).round() as i64
        }
        _ => 0,
    }
}

/// One row per step `0..=last_step`; `sessions` counts distinct sessions
/// that entered the step.
pub fn step_rows(events: &[QuizStepEvent], last_step: u32) -> Vec<FunnelStepRow> {
    let mut entered: HashMap<u32, HashSet<&str>> = HashMap::new();
    for e in events.iter().filter(|e| e.event_type == EventType::StepEntered) {
        entered.entry(e.step_number).or_default().insert(e.session_id.as_str());
    }

    let mut prev = None;
    (0..=last_step)
        .map(|step| {
            let sessions = entered.get(&step).map_or(0, HashSet::len);
            let row = FunnelStepRow {
                step,
                sessions,
                drop_rate: drop_rate(prev, sessions),
            };
            prev = Some(sessions);
            row
        })
        .collect()
}

pub fn funnel(store: &QuizFlowStore, query: &ReportQuery, now: DateTime<Utc>, last_step: u32) -> FunnelReport {
    let since = query.since(now);
    let funnel = query
        .categories()
        .into_iter()
        .map(|category| {
            let events = store.step_events(&Window::new(since, Some(category)), EventSource::Quiz);
            (category, step_rows(&events, last_step))
        })
        .collect();
    FunnelReport { funnel }
}

// ─── dropoffs ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropoffRow {
    pub step: u32,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropoffReport {
    pub total_abandoned: usize,
    /// Steps where most abandoned sessions stopped, largest first.
    pub dropoffs: Vec<DropoffRow>,
    pub by_category: BTreeMap<QuizCategory, Vec<DropoffRow>>,
}

fn dropoff_rows(last_steps: &[u32]) -> Vec<DropoffRow> {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for step in last_steps {
        *counts.entry(*step).or_insert(0) += 1;
    }
    let total = last_steps.len();
    let mut rows: Vec<DropoffRow> = counts
        .into_iter()
        .map(|(step, count)| DropoffRow {
            step,
            count,
            percentage: percent(count, total),
        })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.step.cmp(&b.step)));
    rows
}

/// A drop-off is an abandoned session's last recorded step.
pub fn dropoffs(store: &QuizFlowStore, query: &ReportQuery, now: DateTime<Utc>) -> DropoffReport {
    let abandoned: Vec<_> = quiz_sessions(store, query, now)
        .into_iter()
        .filter(|s| s.outcome == SessionOutcome::Abandoned)
        .collect();

    let all: Vec<u32> = abandoned.iter().map(|s| s.last_step).collect();
    let by_category = query
        .categories()
        .into_iter()
        .map(|category| {
            let steps: Vec<u32> = abandoned
                .iter()
                .filter(|s| s.category == Some(category))
                .map(|s| s.last_step)
                .collect();
            (category, dropoff_rows(&steps))
        })
        .collect();

    DropoffReport {
        total_abandoned: abandoned.len(),
        dropoffs: dropoff_rows(&all),
        by_category,
    }
}

// ─── user-journey ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyStep {
    pub step: u32,
    pub sessions: usize,
    pub drop_rate: i64,
    pub avg_time_seconds: Option<f64>,
    pub skips: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferCounts {
    pub premium: usize,
    pub single: usize,
    pub digital: usize,
}

impl OfferCounts {
    fn bump(&mut self, tier: &str) {
        match tier {
            "premium" => self.premium += 1,
            "single" => self.single += 1,
            "digital" => self.digital += 1,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJourney {
    pub sessions: usize,
    pub steps: Vec<JourneyStep>,
    /// Sessions that saw each tier.
    pub offers_seen: OfferCounts,
    /// Offer clicks by tier.
    pub offer_clicks: OfferCounts,
    pub exit_intents: usize,
    pub purchases: usize,
    pub leads: usize,
    pub purchase_rate: f64,
}

/// The eight result-funnel micro-steps and what happened on the offers.
pub fn user_journey(store: &QuizFlowStore, query: &ReportQuery, now: DateTime<Utc>) -> UserJourney {
    const MICRO_STEPS: u32 = 8;
    let events = store.step_events(&query.window(now), EventSource::Funnel);
    let sessions: HashSet<&str> = events.iter().map(|e| e.session_id.as_str()).collect();

    let rows = step_rows(&events, MICRO_STEPS);
    let steps = rows
        .into_iter()
        .filter(|r| r.step >= 1)
        .enumerate()
        .map(|(i, r)| {
            let exits: Vec<u64> = events
                .iter()
                .filter(|e| e.event_type == EventType::StepExited && e.step_number == r.step)
                .filter_map(|e| e.time_spent_seconds)
                .collect();
            let avg_time_seconds = (!exits.is_empty())
                .then(|| exits.iter().sum::<u64>() as f64 / exits.len() as f64)
                .map(|avg| (avg * 10.0).round() / 10.0);
            JourneyStep {
                step: r.step,
                sessions: r.sessions,
                drop_rate: if i == 0 { 0 } else { r.drop_rate },
                avg_time_seconds,
                skips: events
                    .iter()
                    .filter(|e| e.event_type == EventType::SkipUsed && e.step_number == r.step)
                    .count(),
            }
        })
        .collect();

    let mut seen: HashMap<&str, HashSet<String>> = HashMap::new();
    let mut offer_clicks = OfferCounts::default();
    let mut purchases = HashSet::new();
    let mut leads = HashSet::new();
    for e in &events {
        let tier = e.metadata.get("tier").and_then(|t| t.as_str());
        match e.event_type {
            EventType::StepEntered if e.step_number == MICRO_STEPS => {
                seen.entry(e.session_id.as_str()).or_default().insert("premium".into());
            }
            EventType::OfferTierChanged => {
                if let Some(to) = e.metadata.get("to").and_then(|t| t.as_str()) {
                    seen.entry(e.session_id.as_str()).or_default().insert(to.to_string());
                }
            }
            EventType::OfferClicked => offer_clicks.bump(tier.unwrap_or_default()),
            EventType::FunnelExit => match e.metadata.get("reason").and_then(|r| r.as_str()) {
                Some("purchase") => {
                    purchases.insert(e.session_id.as_str());
                }
                Some(_) => {
                    leads.insert(e.session_id.as_str());
                }
                None => {}
            },
            _ => {}
        }
    }
    let mut offers_seen = OfferCounts::default();
    for tiers in seen.values() {
        for tier in tiers {
            offers_seen.bump(tier);
        }
    }

    UserJourney {
        sessions: sessions.len(),
        steps,
        offers_seen,
        offer_clicks,
        exit_intents: events.iter().filter(|e| e.event_type == EventType::ExitIntent).count(),
        purchases: purchases.len(),
        leads: leads.len(),
        purchase_rate: percent(purchases.len(), sessions.len()),
    }
}

/// `part / whole` as a percentage with one decimal.
pub fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 1000.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QuizFlowParams, View};
    use chrono::Duration;
    use testograph_core::config::ReportingConfig;
    use testograph_core::event_bus::{make_event, EventSink};
    use uuid::Uuid;

    fn entered(session: &str, step: u32, category: QuizCategory, at: DateTime<Utc>) -> QuizStepEvent {
        QuizStepEvent {
            id: Uuid::new_v4(),
            session_id: session.into(),
            category: Some(category),
            source: EventSource::Quiz,
            event_type: EventType::StepEntered,
            step_number: step,
            time_spent_seconds: None,
            metadata: serde_json::Value::Null,
            created_at: at,
        }
    }

    fn query(pairs: QuizFlowParams) -> ReportQuery {
        ReportQuery::parse(&pairs, &ReportingConfig::default()).unwrap()
    }

    #[test]
    fn test_drop_rate() {
        assert_eq!(drop_rate(None, 10), 0);
        assert_eq!(drop_rate(Some(0), 0), 0);
        assert_eq!(drop_rate(Some(10), 7), 30);
        assert_eq!(drop_rate(Some(3), 2), 33);
        assert_eq!(drop_rate(Some(3), 1), 67);
    }

    #[test]
    fn test_funnel_only_requested_category() {
        let store = QuizFlowStore::new();
        let now = Utc::now();
        for (i, reached) in [24u32, 10, 3, 0].iter().enumerate() {
            for step in 0..=*reached {
                store.insert_step_event(entered(&format!("e{i}"), step, QuizCategory::Energy, now - Duration::hours(1)));
            }
        }
        store.insert_step_event(entered("m0", 0, QuizCategory::Muscle, now));
        store.insert_step_event(entered("old", 0, QuizCategory::Energy, now - Duration::days(8)));

        let q = query(QuizFlowParams {
            view: Some(View::Funnel.as_str().into()),
            category: Some("energy".into()),
            days: Some("7".into()),
            ..QuizFlowParams::default()
        });
        let report = funnel(&store, &q, now, 24);
        assert_eq!(report.funnel.len(), 1);
        let rows = &report.funnel[&QuizCategory::Energy];
        assert_eq!(rows.len(), 25);
        assert_eq!(rows[0].sessions, 4);
        assert_eq!(rows[0].drop_rate, 0);
        assert_eq!(rows[1].sessions, 3);
        assert_eq!(rows[1].drop_rate, 25);
        assert_eq!(rows[24].sessions, 1);
        assert!(rows.windows(2).all(|w| w[1].sessions <= w[0].sessions));

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["funnel"]["energy"].is_array());
        assert_eq!(json["funnel"]["energy"][1]["dropRate"], 25);
    }

    #[test]
    fn test_dropoffs_use_last_step() {
        let store = QuizFlowStore::new();
        let now = Utc::now();
        let old = now - Duration::hours(3);
        for step in 0..=5 {
            store.insert_step_event(entered("a", step, QuizCategory::Libido, old));
        }
        for step in 0..=5 {
            store.insert_step_event(entered("b", step, QuizCategory::Energy, old));
        }
        for step in 0..=2 {
            store.insert_step_event(entered("c", step, QuizCategory::Energy, old));
        }
        let report = dropoffs(&store, &query(QuizFlowParams::default()), now);
        assert_eq!(report.total_abandoned, 3);
        assert_eq!(report.dropoffs[0], DropoffRow { step: 5, count: 2, percentage: 66.7 });
        assert_eq!(report.by_category[&QuizCategory::Energy].len(), 2);
    }

    #[test]
    fn test_user_journey_counts_offers() {
        let store = QuizFlowStore::new();
        let now = Utc::now();
        let emit = |t: EventType, session: &str, step: u32, meta: serde_json::Value| {
            store.emit(make_event(t, session, step, now).with_metadata(meta));
        };
        for session in ["x", "y"] {
            for step in 1..=8 {
                emit(EventType::StepEntered, session, step, serde_json::Value::Null);
            }
        }
        emit(EventType::StepEntered, "z", 1, serde_json::Value::Null);
        emit(EventType::OfferTierChanged, "x", 8, serde_json::json!({"from": "premium", "to": "single"}));
        emit(EventType::OfferClicked, "x", 8, serde_json::json!({"tier": "single"}));
        emit(EventType::FunnelExit, "x", 8, serde_json::json!({"reason": "purchase"}));
        emit(EventType::FunnelExit, "y", 8, serde_json::json!({"reason": "declined"}));

        let journey = user_journey(&store, &query(QuizFlowParams::default()), now);
        assert_eq!(journey.sessions, 3);
        assert_eq!(journey.steps.len(), 8);
        assert_eq!(journey.steps[0].sessions, 3);
        assert_eq!(journey.steps[0].drop_rate, 0);
        assert_eq!(journey.steps[1].drop_rate, 33);
        assert_eq!(journey.offers_seen, OfferCounts { premium: 2, single: 1, digital: 0 });
        assert_eq!(journey.offer_clicks.single, 1);
        assert_eq!((journey.purchases, journey.leads), (1, 1));
        assert_eq!(journey.purchase_rate, 33.3);
    }
}
