//! Headline numbers: `stats`, the per-category `overview`, and daily
//! `trends`.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use testograph_core::types::QuizCategory;

use crate::funnel::percent;
use crate::models::{EventSource, PendingOrder, QuizCompletion};
use crate::query::ReportQuery;
use crate::sessions::{summarize, completed_sessions, SessionOutcome, SessionSummary};
use crate::store::{QuizFlowStore, Window};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizStats {
    pub total_sessions: usize,
    pub completions: usize,
    pub completion_rate: f64,
    pub abandoned: usize,
    pub avg_score: Option<f64>,
    pub avg_duration_seconds: Option<f64>,
    pub orders: usize,
    pub paid_orders: usize,
    pub revenue: f64,
    /// Orders per completion.
    pub conversion_rate: f64,
}

fn revenue(orders: &[PendingOrder]) -> f64 {
    let total: f64 = orders.iter().filter(|o| o.status.is_revenue()).map(|o| o.total).sum();
    (total * 100.0).round() / 100.0
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| (sum / n as f64 * 10.0).round() / 10.0)
}

fn compute_stats(summaries: &[SessionSummary], completions: &[QuizCompletion], orders: &[PendingOrder]) -> QuizStats {
    let mut sessions: HashSet<&str> = summaries.iter().map(|s| s.session_id.as_str()).collect();
    sessions.extend(completions.iter().map(|c| c.session_id.as_str()));
    let total_sessions = sessions.len();

    QuizStats {
        total_sessions,
        completions: completions.len(),
        completion_rate: percent(completions.len(), total_sessions),
        abandoned: summaries.iter().filter(|s| s.outcome == SessionOutcome::Abandoned).count(),
        avg_score: average(completions.iter().map(|c| f64::from(c.total_score))),
        avg_duration_seconds: average(
            summaries
                .iter()
                .filter(|s| s.outcome == SessionOutcome::Completed)
                .map(|s| s.duration_seconds as f64),
        ),
        orders: orders.len(),
        paid_orders: orders.iter().filter(|o| o.status == crate::models::OrderStatus::Paid).count(),
        revenue: revenue(orders),
        conversion_rate: percent(orders.len(), completions.len()),
    }
}

struct Slice {
    summaries: Vec<SessionSummary>,
    completions: Vec<QuizCompletion>,
    orders: Vec<PendingOrder>,
}

fn slice(store: &QuizFlowStore, window: &Window, now: DateTime<Utc>) -> Slice {
    let completions = store.completions(window);
    let summaries = summarize(
        &store.step_events(window, EventSource::Quiz),
        &completed_sessions(&completions),
        now,
    );
    Slice {
        summaries,
        completions,
        orders: store.orders(window),
    }
}

pub fn stats(store: &QuizFlowStore, query: &ReportQuery, now: DateTime<Utc>) -> QuizStats {
    let s = slice(store, &query.window(now), now);
    compute_stats(&s.summaries, &s.completions, &s.orders)
}

// ─── overview ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryOverview {
    #[serde(flatten)]
    pub stats: QuizStats,
    /// Step where most abandoned sessions stopped.
    pub top_dropoff_step: Option<u32>,
    /// Result band counts among completions.
    pub levels: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub days: i64,
    pub totals: QuizStats,
    pub categories: BTreeMap<QuizCategory, CategoryOverview>,
    pub generated_at: DateTime<Utc>,
}

pub fn overview(store: &QuizFlowStore, query: &ReportQuery, now: DateTime<Utc>) -> Overview {
    let since = query.since(now);
    let categories = query
        .categories()
        .into_iter()
        .map(|category| {
            let s = slice(store, &Window::new(since, Some(category)), now);
            let mut dropoffs: BTreeMap<u32, usize> = BTreeMap::new();
            for summary in s.summaries.iter().filter(|s| s.outcome == SessionOutcome::Abandoned) {
                *dropoffs.entry(summary.last_step).or_insert(0) += 1;
            }
            let top_dropoff_step = dropoffs
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(step, _)| *step);
            let mut levels = BTreeMap::new();
            for c in &s.completions {
                *levels.entry(c.level.clone()).or_insert(0) += 1;
            }
            let overview = CategoryOverview {
                stats: compute_stats(&s.summaries, &s.completions, &s.orders),
                top_dropoff_step,
                levels,
            };
            (category, overview)
        })
        .collect();

    Overview {
        days: query.days,
        totals: stats(store, query, now),
        categories,
        generated_at: now,
    }
}

// ─── trends ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub sessions: usize,
    pub completions: usize,
    pub completion_rate: f64,
    pub orders: usize,
    pub revenue: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Trends {
    pub trends: Vec<TrendPoint>,
}

/// One point per calendar day (UTC) in the window, oldest first, including
/// days with no activity.
pub fn trends(store: &QuizFlowStore, query: &ReportQuery, now: DateTime<Utc>) -> Trends {
    let s = slice(store, &query.window(now), now);
    let today = now.date_naive();
    let first = today - Duration::days(query.days - 1);

    let mut sessions: BTreeMap<NaiveDate, HashSet<&str>> = BTreeMap::new();
    for summary in &s.summaries {
        sessions
            .entry(summary.first_seen.date_naive())
            .or_default()
            .insert(summary.session_id.as_str());
    }
    for c in &s.completions {
        sessions.entry(c.created_at.date_naive()).or_default().insert(c.session_id.as_str());
    }

    let trends = first
        .iter_days()
        .take_while(|d| *d <= today)
        .map(|date| {
            let day_sessions = sessions.get(&date).map_or(0, HashSet::len);
            let completions = s.completions.iter().filter(|c| c.created_at.date_naive() == date).count();
            let orders: Vec<PendingOrder> = s
                .orders
                .iter()
                .filter(|o| o.created_at.date_naive() == date)
                .cloned()
                .collect();
            TrendPoint {
                date,
                sessions: day_sessions,
                completions,
                completion_rate: percent(completions, day_sessions),
                orders: orders.len(),
                revenue: revenue(&orders),
            }
        })
        .collect();
    Trends { trends }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderStatus, QuizStepEvent};
    use crate::query::QuizFlowParams;
    use testograph_core::config::ReportingConfig;
    use testograph_core::types::EventType;
    use uuid::Uuid;

    fn store_with_data(now: DateTime<Utc>) -> QuizFlowStore {
        let store = QuizFlowStore::new();
        let at = now - Duration::hours(2);
        for (session, category, completed) in [
            ("a", QuizCategory::Energy, true),
            ("b", QuizCategory::Energy, false),
            ("c", QuizCategory::Muscle, true),
        ] {
            store.insert_step_event(QuizStepEvent {
                id: Uuid::new_v4(),
                session_id: session.into(),
                category: Some(category),
                source: EventSource::Quiz,
                event_type: EventType::StepEntered,
                step_number: if completed { 24 } else { 7 },
                time_spent_seconds: None,
                metadata: serde_json::Value::Null,
                created_at: at,
            });
            if completed {
                store.insert_completion(QuizCompletion {
                    id: Uuid::new_v4(),
                    session_id: session.into(),
                    category,
                    first_name: None,
                    email: Some(format!("{session}@example.com")),
                    phone: None,
                    age: None,
                    total_score: if session == "a" { 40 } else { 60 },
                    level: "moderate".into(),
                    created_at: at,
                });
            }
        }
        store.insert_order(PendingOrder {
            id: Uuid::new_v4(),
            session_id: Some("a".into()),
            email: "a@example.com".into(),
            first_name: None,
            category: Some(QuizCategory::Energy),
            tier: "premium".into(),
            total: 97.0,
            currency: "EUR".into(),
            status: OrderStatus::Paid,
            created_at: at,
        });
        store
    }

    fn query(days: &str, category: Option<&str>) -> ReportQuery {
        let params = QuizFlowParams {
            days: Some(days.into()),
            category: category.map(str::to_string),
            ..QuizFlowParams::default()
        };
        ReportQuery::parse(&params, &ReportingConfig::default()).unwrap()
    }

    #[test]
    fn test_stats() {
        let now = Utc::now();
        let store = store_with_data(now);
        let s = stats(&store, &query("7", None), now);
        assert_eq!(s.total_sessions, 3);
        assert_eq!(s.completions, 2);
        assert_eq!(s.completion_rate, 66.7);
        assert_eq!(s.abandoned, 1);
        assert_eq!(s.avg_score, Some(50.0));
        assert_eq!(s.revenue, 97.0);
        assert_eq!(s.conversion_rate, 50.0);
    }

    #[test]
    fn test_overview_per_category() {
        let now = Utc::now();
        let store = store_with_data(now);
        let o = overview(&store, &query("7", Some("energy")), now);
        assert_eq!(o.categories.len(), 1);
        let energy = &o.categories[&QuizCategory::Energy];
        assert_eq!(energy.stats.total_sessions, 2);
        assert_eq!(energy.top_dropoff_step, Some(7));
        assert_eq!(energy.levels.get("moderate"), Some(&1));
        assert_eq!(o.totals.total_sessions, 2);
    }

    #[test]
    fn test_trends_cover_every_day() {
        let now = Utc::now();
        let store = store_with_data(now);
        let t = trends(&store, &query("5", None), now);
        assert_eq!(t.trends.len(), 5);
        assert_eq!(t.trends.last().unwrap().date, now.date_naive());
        let total: usize = t.trends.iter().map(|p| p.sessions).sum();
        assert_eq!(total, 3);
        assert!(t.trends.windows(2).all(|w| w[0].date < w[1].date));
    }
}
