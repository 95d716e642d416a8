//! Per-session views: lists, explorer, detail, timeline and the CRM lead
//! table.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use testograph_core::types::{EventType, QuizCategory};
use testograph_core::{TestographError, TestographResult};

use crate::models::{EventSource, OrderStatus, PendingOrder, QuizCompletion, QuizStepEvent};
use crate::query::ReportQuery;
use crate::store::QuizFlowStore;

/// A quiz session with no events for this long counts as abandoned.
pub const IDLE_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    Abandoned,
    InProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub category: Option<QuizCategory>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub duration_seconds: i64,
    pub events: usize,
    pub last_step: u32,
    pub steps_visited: usize,
    pub back_clicks: usize,
    pub skips: usize,
    pub page_hides: usize,
    pub outcome: SessionOutcome,
}

/// Fold step events (any order) into one summary per session, most
/// recently active first.
pub fn summarize(events: &[QuizStepEvent], completed: &HashSet<String>, now: DateTime<Utc>) -> Vec<SessionSummary> {
    let mut by_session: HashMap<&str, Vec<&QuizStepEvent>> = HashMap::new();
    for event in events {
        by_session.entry(event.session_id.as_str()).or_default().push(event);
    }

    let mut summaries: Vec<SessionSummary> = by_session
        .into_iter()
        .filter_map(|(session_id, rows)| summarize_one(session_id, &rows, completed, now))
        .collect();
    summaries.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then_with(|| a.session_id.cmp(&b.session_id)));
    summaries
}

fn summarize_one(
    session_id: &str,
    rows: &[&QuizStepEvent],
    completed: &HashSet<String>,
    now: DateTime<Utc>,
) -> Option<SessionSummary> {
    let first_seen = rows.iter().map(|e| e.created_at).min()?;
    let last_seen = rows.iter().map(|e| e.created_at).max()?;
    let count = |t: EventType| rows.iter().filter(|e| e.event_type == t).count();
    let steps: BTreeSet<u32> = rows.iter().map(|e| e.step_number).collect();

    let outcome = if completed.contains(session_id) || count(EventType::QuizCompleted) > 0 {
        SessionOutcome::Completed
    } else if count(EventType::QuizAbandoned) > 0 || now - last_seen > Duration::minutes(IDLE_MINUTES) {
        SessionOutcome::Abandoned
    } else {
        SessionOutcome::InProgress
    };

    Some(SessionSummary {
        session_id: session_id.to_string(),
        category: rows.iter().find_map(|e| e.category),
        first_seen,
        last_seen,
        duration_seconds: (last_seen - first_seen).num_seconds(),
        events: rows.len(),
        last_step: steps.iter().next_back().copied().unwrap_or(0),
        steps_visited: steps.len(),
        back_clicks: count(EventType::BackClicked),
        skips: count(EventType::SkipUsed),
        page_hides: count(EventType::PageHidden),
        outcome,
    })
}

pub(crate) fn completed_sessions(completions: &[QuizCompletion]) -> HashSet<String> {
    completions.iter().map(|c| c.session_id.clone()).collect()
}

/// Quiz sessions in the window, summarised.
pub(crate) fn quiz_sessions(store: &QuizFlowStore, query: &ReportQuery, now: DateTime<Utc>) -> Vec<SessionSummary> {
    let window = query.window(now);
    let completed = completed_sessions(&store.completions(&window));
    summarize(&store.step_events(&window, EventSource::Quiz), &completed, now)
}

// ─── sessions / completions ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    #[serde(flatten)]
    pub rows: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionRows {
    pub sessions: Vec<SessionSummary>,
}

pub fn sessions(store: &QuizFlowStore, query: &ReportQuery, now: DateTime<Utc>) -> Page<SessionRows> {
    let all = quiz_sessions(store, query, now);
    Page {
        total: all.len(),
        limit: query.limit,
        offset: query.offset,
        rows: SessionRows {
            sessions: query.page(&all),
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionRows {
    pub completions: Vec<QuizCompletion>,
}

pub fn completions(store: &QuizFlowStore, query: &ReportQuery, now: DateTime<Utc>) -> Page<CompletionRows> {
    let all = store.completions(&query.window(now));
    Page {
        total: all.len(),
        limit: query.limit,
        offset: query.offset,
        rows: CompletionRows {
            completions: query.page(&all),
        },
    }
}

// ─── session-explorer ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerRow {
    #[serde(flatten)]
    pub summary: SessionSummary,
    /// Steps in the order they were first entered.
    pub path: Vec<u32>,
    /// Seconds spent per step, from `step_exited` events.
    pub time_by_step: BTreeMap<u32, u64>,
    pub slowest_step: Option<u32>,
    /// Highest result-funnel micro-step reached, if the visitor got there.
    pub funnel_step: Option<u32>,
    pub order_status: Option<OrderStatus>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeCounts {
    pub completed: usize,
    pub abandoned: usize,
    pub in_progress: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerRows {
    pub sessions: Vec<ExplorerRow>,
    pub outcomes: OutcomeCounts,
}

pub fn session_explorer(store: &QuizFlowStore, query: &ReportQuery, now: DateTime<Utc>) -> Page<ExplorerRows> {
    let window = query.window(now);
    let completions = store.completions(&window);
    let quiz_events = store.step_events(&window, EventSource::Quiz);
    let funnel_events = store.step_events(&window, EventSource::Funnel);
    let all = summarize(&quiz_events, &completed_sessions(&completions), now);

    let mut outcomes = OutcomeCounts::default();
    for s in &all {
        match s.outcome {
            SessionOutcome::Completed => outcomes.completed += 1,
            SessionOutcome::Abandoned => outcomes.abandoned += 1,
            SessionOutcome::InProgress => outcomes.in_progress += 1,
        }
    }

    let emails: HashMap<&str, String> = completions
        .iter()
        .filter_map(|c| Some((c.session_id.as_str(), c.email.as_ref()?.to_lowercase())))
        .collect();
    let orders = store.latest_orders_by_email();

    let rows = query
        .page(&all)
        .into_iter()
        .map(|summary| {
            let mine: Vec<&QuizStepEvent> = quiz_events.iter().filter(|e| e.session_id == summary.session_id).collect();
            let mut path = Vec::new();
            let mut time_by_step = BTreeMap::new();
            for e in &mine {
                if e.event_type == EventType::StepEntered && !path.contains(&e.step_number) {
                    path.push(e.step_number);
                }
                if e.event_type == EventType::StepExited {
                    *time_by_step.entry(e.step_number).or_insert(0) += e.time_spent_seconds.unwrap_or(0);
                }
            }
            let slowest_step = time_by_step
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(step, _)| *step);
            let funnel_step = funnel_events
                .iter()
                .filter(|e| e.session_id == summary.session_id)
                .map(|e| e.step_number)
                .max();
            let order_status = emails
                .get(summary.session_id.as_str())
                .and_then(|email| orders.get(email))
                .map(|o| o.status);
            ExplorerRow {
                summary,
                path,
                time_by_step,
                slowest_step,
                funnel_step,
                order_status,
            }
        })
        .collect();

    Page {
        total: all.len(),
        limit: query.limit,
        offset: query.offset,
        rows: ExplorerRows { sessions: rows, outcomes },
    }
}

// ─── session-detail / session-timeline ──────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRow {
    pub step: u32,
    pub answer: serde_json::Value,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    pub session_id: String,
    pub summary: Option<SessionSummary>,
    pub completion: Option<QuizCompletion>,
    pub orders: Vec<PendingOrder>,
    pub answers: Vec<AnswerRow>,
    pub events: Vec<QuizStepEvent>,
}

pub fn session_detail(store: &QuizFlowStore, session_id: &str, now: DateTime<Utc>) -> TestographResult<SessionDetail> {
    let events = store.session_events(session_id);
    let completion = store.session_completion(session_id);
    let mut orders = store.session_orders(session_id);
    if orders.is_empty() {
        if let Some(email) = completion.as_ref().and_then(|c| c.email.as_ref()) {
            orders.extend(store.latest_orders_by_email().remove(&email.to_lowercase()));
        }
    }
    if events.is_empty() && completion.is_none() && orders.is_empty() {
        return Err(TestographError::NotFound(format!("Session '{session_id}' not found")));
    }

    let completed: HashSet<String> = completion.iter().map(|c| c.session_id.clone()).collect();
    let quiz: Vec<QuizStepEvent> = events.iter().filter(|e| e.source == EventSource::Quiz).cloned().collect();
    let summary = summarize(&quiz, &completed, now).into_iter().next();
    let answers = quiz
        .iter()
        .filter(|e| e.event_type == EventType::AnswerSelected)
        .map(|e| AnswerRow {
            step: e.step_number,
            answer: e.metadata.get("answer").cloned().unwrap_or_else(|| e.metadata.clone()),
            at: e.created_at,
        })
        .collect();

    Ok(SessionDetail {
        session_id: session_id.to_string(),
        summary,
        completion,
        orders,
        answers,
        events,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub at: DateTime<Utc>,
    pub offset_seconds: i64,
    pub source: EventSource,
    pub event_type: EventType,
    pub step: u32,
    pub time_spent_seconds: Option<u64>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTimeline {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub timeline: Vec<TimelineEntry>,
}

pub fn session_timeline(store: &QuizFlowStore, session_id: &str) -> TestographResult<SessionTimeline> {
    let events = store.session_events(session_id);
    let (Some(first), Some(last)) = (events.first(), events.last()) else {
        return Err(TestographError::NotFound(format!("No events for session '{session_id}'")));
    };
    let started_at = first.created_at;
    let ended_at = last.created_at;
    let timeline = events
        .into_iter()
        .map(|e| TimelineEntry {
            at: e.created_at,
            offset_seconds: (e.created_at - started_at).num_seconds(),
            source: e.source,
            event_type: e.event_type,
            step: e.step_number,
            time_spent_seconds: e.time_spent_seconds,
            metadata: e.metadata,
        })
        .collect();
    Ok(SessionTimeline {
        session_id: session_id.to_string(),
        started_at,
        ended_at,
        timeline,
    })
}

// ─── crm ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmLead {
    pub session_id: String,
    pub first_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub category: QuizCategory,
    pub total_score: u32,
    pub level: String,
    pub created_at: DateTime<Utc>,
    pub order_status: Option<OrderStatus>,
    pub order_tier: Option<String>,
    pub order_total: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmRows {
    pub leads: Vec<CrmLead>,
    pub with_orders: usize,
}

/// Completions that left contact details, joined to their latest order.
pub fn crm(store: &QuizFlowStore, query: &ReportQuery, now: DateTime<Utc>) -> Page<CrmRows> {
    let orders = store.latest_orders_by_email();
    let leads: Vec<CrmLead> = store
        .completions(&query.window(now))
        .into_iter()
        .filter(|c| c.email.is_some() || c.phone.is_some())
        .map(|c| {
            let order = c.email.as_ref().and_then(|e| orders.get(&e.to_lowercase()));
            CrmLead {
                order_status: order.map(|o| o.status),
                order_tier: order.map(|o| o.tier.clone()),
                order_total: order.map(|o| o.total),
                session_id: c.session_id,
                first_name: c.first_name,
                email: c.email,
                phone: c.phone,
                category: c.category,
                total_score: c.total_score,
                level: c.level,
                created_at: c.created_at,
            }
        })
        .collect();
    let with_orders = leads.iter().filter(|l| l.order_status.is_some()).count();
    Page {
        total: leads.len(),
        limit: query.limit,
        offset: query.offset,
        rows: CrmRows {
            leads: query.page(&leads),
            with_orders,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QuizFlowParams, View};
    use testograph_core::config::ReportingConfig;
    use uuid::Uuid;

    fn event(session: &str, t: EventType, step: u32, at: DateTime<Utc>) -> QuizStepEvent {
        QuizStepEvent {
            id: Uuid::new_v4(),
            session_id: session.into(),
            category: Some(QuizCategory::Energy),
            source: EventSource::Quiz,
            event_type: t,
            step_number: step,
            time_spent_seconds: (t == EventType::StepExited).then_some(u64::from(step) + 4),
            metadata: serde_json::json!({ "answer": step }),
            created_at: at,
        }
    }

    fn query(view: View) -> ReportQuery {
        let params = QuizFlowParams {
            view: Some(view.as_str().to_string()),
            session_id: Some("s1".into()),
            ..QuizFlowParams::default()
        };
        ReportQuery::parse(&params, &ReportingConfig::default()).unwrap()
    }

    fn seeded(now: DateTime<Utc>) -> QuizFlowStore {
        let store = QuizFlowStore::new();
        for step in 0..5 {
            let at = now - Duration::minutes(10) + Duration::seconds(i64::from(step) * 10);
            store.insert_step_event(event("s1", EventType::StepEntered, step, at));
            store.insert_step_event(event("s1", EventType::StepExited, step, at + Duration::seconds(9)));
        }
        store.insert_step_event(event("s1", EventType::AnswerSelected, 2, now - Duration::minutes(9)));
        store.insert_step_event(event("s2", EventType::StepEntered, 0, now - Duration::hours(2)));
        store.insert_step_event(event("s3", EventType::StepEntered, 0, now - Duration::minutes(1)));
        store
    }

    #[test]
    fn test_outcomes() {
        let now = Utc::now();
        let store = seeded(now);
        let summaries = quiz_sessions(&store, &query(View::Sessions), now);
        let outcome = |id: &str| summaries.iter().find(|s| s.session_id == id).map(|s| s.outcome);
        assert_eq!(outcome("s2"), Some(SessionOutcome::Abandoned));
        assert_eq!(outcome("s3"), Some(SessionOutcome::InProgress));
        assert_eq!(summaries[0].session_id, "s3", "most recent first");

        let s1 = summaries.iter().find(|s| s.session_id == "s1").unwrap();
        assert_eq!(s1.last_step, 4);
        assert_eq!(s1.steps_visited, 5);
    }

    #[test]
    fn test_explorer_paths_and_slowest_step() {
        let now = Utc::now();
        let store = seeded(now);
        let page = session_explorer(&store, &query(View::SessionExplorer), now);
        assert_eq!(page.total, 3);
        let s1 = page.rows.sessions.iter().find(|r| r.summary.session_id == "s1").unwrap();
        assert_eq!(s1.path, vec![0, 1, 2, 3, 4]);
        assert_eq!(s1.slowest_step, Some(4));
        assert_eq!(page.rows.outcomes.abandoned, 1);
        assert_eq!(page.rows.outcomes.in_progress, 2);
    }

    #[test]
    fn test_detail_and_timeline() {
        let now = Utc::now();
        let store = seeded(now);
        let detail = session_detail(&store, "s1", now).unwrap();
        assert_eq!(detail.answers.len(), 1);
        assert_eq!(detail.answers[0].answer, serde_json::json!(2));

        let timeline = session_timeline(&store, "s1").unwrap();
        assert_eq!(timeline.timeline[0].offset_seconds, 0);
        assert!(timeline.timeline.windows(2).all(|w| w[0].at <= w[1].at));

        assert!(matches!(session_detail(&store, "nobody", now), Err(TestographError::NotFound(_))));
        assert!(matches!(session_timeline(&store, "nobody"), Err(TestographError::NotFound(_))));
    }
}
