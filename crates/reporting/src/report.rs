//! Entry point for `GET /api/admin/quiz-flow`: picks the view and renders it.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use testograph_core::config::ReportingConfig;
use testograph_core::{TestographError, TestographResult};
use tracing::debug;

use crate::export::{csv_export, CsvExport};
use crate::query::{ReportQuery, View};
use crate::store::QuizFlowStore;
use crate::{dashboard, funnel, sessions};

#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutput {
    Json(serde_json::Value),
    Csv(CsvExport),
}

#[derive(Clone)]
pub struct QuizFlowReport {
    store: Arc<QuizFlowStore>,
    config: ReportingConfig,
}

impl QuizFlowReport {
    pub fn new(store: Arc<QuizFlowStore>, config: ReportingConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<QuizFlowStore> {
        &self.store
    }

    pub fn config(&self) -> &ReportingConfig {
        &self.config
    }

    /// Render one view. Each view reads the tables on its own.
    pub fn run(&self, query: &ReportQuery, now: DateTime<Utc>) -> TestographResult<ReportOutput> {
        metrics::counter!("reporting.views", "view" => query.view.as_str()).increment(1);
        debug!(view = %query.view, days = query.days, category = ?query.category, "Rendering quiz-flow view");

        let store = self.store.as_ref();
        let json = match query.view {
            View::Stats => to_json(dashboard::stats(store, query, now))?,
            View::Funnel => to_json(funnel::funnel(store, query, now, self.config.quiz_last_step))?,
            View::Dropoffs => to_json(funnel::dropoffs(store, query, now))?,
            View::Sessions => to_json(sessions::sessions(store, query, now))?,
            View::Completions => to_json(sessions::completions(store, query, now))?,
            View::Overview => to_json(dashboard::overview(store, query, now))?,
            View::SessionDetail => to_json(sessions::session_detail(store, session_id(query)?, now)?)?,
            View::Trends => to_json(dashboard::trends(store, query, now))?,
            View::UserJourney => to_json(funnel::user_journey(store, query, now))?,
            View::Crm => to_json(sessions::crm(store, query, now))?,
            View::SessionExplorer => to_json(sessions::session_explorer(store, query, now))?,
            View::SessionTimeline => to_json(sessions::session_timeline(store, session_id(query)?)?)?,
            View::CsvExport => return Ok(ReportOutput::Csv(csv_export(store, query, now))),
        };
        Ok(ReportOutput::Json(json))
    }
}

fn session_id(query: &ReportQuery) -> TestographResult<&str> {
    query
        .session_id
        .as_deref()
        .ok_or_else(|| TestographError::Validation(format!("session_id is required for view '{}'", query.view)))
}

fn to_json<T: serde::Serialize>(value: T) -> TestographResult<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}
