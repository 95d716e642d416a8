//! Query-string parsing for the quiz-flow endpoint.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use testograph_core::config::ReportingConfig;
use testograph_core::types::QuizCategory;
use testograph_core::TestographError;

use crate::store::Window;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Stats,
    Funnel,
    Dropoffs,
    Sessions,
    Completions,
    Overview,
    SessionDetail,
    Trends,
    UserJourney,
    Crm,
    SessionExplorer,
    SessionTimeline,
    CsvExport,
}

impl View {
    pub const ALL: [View; 13] = [
        View::Stats,
        View::Funnel,
        View::Dropoffs,
        View::Sessions,
        View::Completions,
        View::Overview,
        View::SessionDetail,
        View::Trends,
        View::UserJourney,
        View::Crm,
        View::SessionExplorer,
        View::SessionTimeline,
        View::CsvExport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            View::Stats => "stats",
            View::Funnel => "funnel",
            View::Dropoffs => "dropoffs",
            View::Sessions => "sessions",
            View::Completions => "completions",
            View::Overview => "overview",
            View::SessionDetail => "session-detail",
            View::Trends => "trends",
            View::UserJourney => "user-journey",
            View::Crm => "crm",
            View::SessionExplorer => "session-explorer",
            View::SessionTimeline => "session-timeline",
            View::CsvExport => "csv-export",
        }
    }

    /// Views that are about one session and need `session_id`.
    pub fn needs_session(&self) -> bool {
        matches!(self, View::SessionDetail | View::SessionTimeline)
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for View {
    type Err = TestographError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        View::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| TestographError::Validation(format!("Unknown view '{s}'")))
    }
}

/// Raw query parameters, as strings so malformed numbers fall back to
/// defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuizFlowParams {
    pub view: Option<String>,
    pub days: Option<String>,
    pub category: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportQuery {
    pub view: View,
    pub days: i64,
    pub category: Option<QuizCategory>,
    pub limit: usize,
    pub offset: usize,
    pub session_id: Option<String>,
}

impl ReportQuery {
    pub fn parse(params: &QuizFlowParams, config: &ReportingConfig) -> Result<Self, TestographError> {
        let view = match params.view.as_deref().map(str::trim) {
            None | Some("") => View::Stats,
            Some(v) => v.parse()?,
        };

        let days = params
            .days
            .as_deref()
            .and_then(|d| d.trim().parse::<i64>().ok())
            .unwrap_or(config.default_days)
            .clamp(1, config.max_days.max(1));

        let category = match params.category.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(c) => Some(c.parse::<QuizCategory>().map_err(TestographError::Validation)?),
        };

        let limit = params
            .limit
            .as_deref()
            .and_then(|l| l.trim().parse::<usize>().ok())
            .unwrap_or(config.default_limit)
            .clamp(1, config.max_limit.max(1));

        let offset = params
            .offset
            .as_deref()
            .and_then(|o| o.trim().parse::<usize>().ok())
            .unwrap_or(0);

        let session_id = params
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if view.needs_session() && session_id.is_none() {
            return Err(TestographError::Validation(format!("session_id is required for view '{view}'")));
        }

        Ok(Self {
            view,
            days,
            category,
            limit,
            offset,
            session_id,
        })
    }

    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.days)
    }

    pub fn window(&self, now: DateTime<Utc>) -> Window {
        Window::new(self.since(now), self.category)
    }

    /// Categories the report is broken down by.
    pub fn categories(&self) -> Vec<QuizCategory> {
        match self.category {
            Some(c) => vec![c],
            None => QuizCategory::ALL.to_vec(),
        }
    }

    pub fn page<T: Clone>(&self, rows: &[T]) -> Vec<T> {
        rows.iter().skip(self.offset).take(self.limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> QuizFlowParams {
        let mut p = QuizFlowParams::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "view" => p.view = v,
                "days" => p.days = v,
                "category" => p.category = v,
                "limit" => p.limit = v,
                "offset" => p.offset = v,
                "session_id" => p.session_id = v,
                _ => unreachable!(),
            }
        }
        p
    }

    fn parse(pairs: &[(&str, &str)]) -> Result<ReportQuery, TestographError> {
        ReportQuery::parse(&params(pairs), &ReportingConfig::default())
    }

    #[test]
    fn test_defaults() {
        let q = parse(&[]).unwrap();
        assert_eq!(q.view, View::Stats);
        assert_eq!(q.days, 7);
        assert_eq!(q.limit, 50);
        assert_eq!(q.offset, 0);
        assert_eq!(q.categories().len(), 3);
    }

    #[test]
    fn test_clamping_and_lenient_numbers() {
        let q = parse(&[("days", "9000"), ("limit", "100000"), ("offset", "x")]).unwrap();
        assert_eq!(q.days, 365);
        assert_eq!(q.limit, 500);
        assert_eq!(q.offset, 0);

        let q = parse(&[("days", "0"), ("limit", "0")]).unwrap();
        assert_eq!(q.days, 1);
        assert_eq!(q.limit, 1);

        assert_eq!(parse(&[("days", "abc")]).unwrap().days, 7);
    }

    #[test]
    fn test_category_validation() {
        let q = parse(&[("category", "Energy")]).unwrap();
        assert_eq!(q.categories(), vec![QuizCategory::Energy]);
        assert!(parse(&[("category", "all")]).unwrap().category.is_none());
        assert!(matches!(parse(&[("category", "sleep")]), Err(TestographError::Validation(_))));
    }

    #[test]
    fn test_views() {
        assert!(matches!(parse(&[("view", "bogus")]), Err(TestographError::Validation(_))));
        assert!(matches!(parse(&[("view", "session-detail")]), Err(TestographError::Validation(_))));
        let q = parse(&[("view", "session-timeline"), ("session_id", "abc")]).unwrap();
        assert_eq!(q.view, View::SessionTimeline);
        for view in View::ALL {
            assert_eq!(view.as_str().parse::<View>().unwrap(), view);
        }
    }

    #[test]
    fn test_page() {
        let q = parse(&[("limit", "2"), ("offset", "1")]).unwrap();
        assert_eq!(q.page(&[1, 2, 3, 4]), vec![2, 3]);
    }
}
