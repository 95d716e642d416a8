//! CSV export of quiz completions joined to their latest order.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::query::ReportQuery;
use crate::store::QuizFlowStore;

pub const CSV_COLUMNS: [&str; 12] = [
    "created_at",
    "session_id",
    "category",
    "first_name",
    "email",
    "phone",
    "age",
    "total_score",
    "level",
    "order_status",
    "order_tier",
    "order_total",
];

#[derive(Debug, Clone, PartialEq)]
pub struct CsvExport {
    pub filename: String,
    pub body: String,
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s.replace('"', "\"\"")),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| Value::String(s.to_string()))
}

/// Every completion in the window, newest first. Not paginated.
pub fn csv_export(store: &QuizFlowStore, query: &ReportQuery, now: DateTime<Utc>) -> CsvExport {
    let orders = store.latest_orders_by_email();
    let mut body = CSV_COLUMNS.join(",");
    body.push('\n');

    for c in store.completions(&query.window(now)) {
        let order = c.email.as_ref().and_then(|e| orders.get(&e.to_lowercase()));
        let row = [
            Value::String(c.created_at.to_rfc3339()),
            Value::String(c.session_id.clone()),
            Value::String(c.category.as_str().to_string()),
            text(c.first_name.as_deref()),
            text(c.email.as_deref()),
            text(c.phone.as_deref()),
            c.age.map_or(Value::Null, Value::from),
            Value::from(c.total_score),
            Value::String(c.level.clone()),
            text(order.map(|o| o.status.as_str())),
            text(order.map(|o| o.tier.as_str())),
            order.map_or(Value::Null, |o| Value::from(o.total)),
        ];
        let cells: Vec<String> = row.iter().map(cell).collect();
        body.push_str(&cells.join(","));
        body.push('\n');
    }

    let scope = query.category.map_or("all", |c| c.as_str());
    CsvExport {
        filename: format!("quiz-flow-{scope}-{}d-{}.csv", query.days, now.format("%Y%m%d")),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuizCompletion;
    use crate::query::QuizFlowParams;
    use testograph_core::config::ReportingConfig;
    use testograph_core::types::QuizCategory;
    use uuid::Uuid;

    #[test]
    fn test_csv_export_quotes_strings() {
        let store = QuizFlowStore::new();
        let now = Utc::now();
        store.insert_completion(QuizCompletion {
            id: Uuid::new_v4(),
            session_id: "s1".into(),
            category: QuizCategory::Libido,
            first_name: Some("Ivan \"Vanko\"".into()),
            email: Some("ivan@example.com".into()),
            phone: None,
            age: Some(44),
            total_score: 61,
            level: "moderate".into(),
            created_at: now,
        });
        let query = ReportQuery::parse(
            &QuizFlowParams {
                view: Some("csv-export".into()),
                ..QuizFlowParams::default()
            },
            &ReportingConfig::default(),
        )
        .unwrap();

        let export = csv_export(&store, &query, now);
        let lines: Vec<&str> = export.body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("created_at,session_id,"));
        assert!(lines[1].contains("\"Ivan \"\"Vanko\"\"\""));
        assert!(lines[1].contains(",44,61,\"moderate\",,,"));
        assert!(export.filename.starts_with("quiz-flow-all-7d-"));
    }
}
