use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use testograph_api::ApiServer;
use testograph_content::{GuideStore, OutlineGenerator};
use testograph_core::config::{AppConfig, ReportingConfig};
use testograph_reporting::seed::seed_demo_data;
use testograph_reporting::{QuizFlowReport, QuizFlowStore};
use tower::ServiceExt;

fn app(seed: bool) -> (Router, Arc<QuizFlowStore>) {
    let store = Arc::new(QuizFlowStore::new());
    if seed {
        seed_demo_data(&store, Utc::now(), 15, 24, 11);
    }
    let report = QuizFlowReport::new(store.clone(), ReportingConfig::default());
    let server = ApiServer::new(
        AppConfig::default(),
        report,
        Arc::new(GuideStore::new()),
        Arc::new(OutlineGenerator),
    );
    (server.router(), store)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, bytes.to_vec())
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_funnel_view_for_one_category() {
    let (app, _) = app(true);
    let (status, _, body) = get(&app, "/api/admin/quiz-flow?view=funnel&days=7&category=energy").await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_slice(&body).unwrap();
    let funnel = json["funnel"].as_object().unwrap();
    assert_eq!(funnel.keys().collect::<Vec<_>>(), vec!["energy"]);
    let rows = funnel["energy"].as_array().unwrap();
    assert_eq!(rows.len(), 25);
    assert_eq!(rows[0]["step"], 0);
    assert_eq!(rows[0]["dropRate"], 0);
}

#[tokio::test]
async fn test_stats_is_the_default_view() {
    let (app, _) = app(true);
    let (status, _, body) = get(&app, "/api/admin/quiz-flow").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["totalSessions"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_bad_requests() {
    let (app, _) = app(false);

    let (status, _, body) = get(&app, "/api/admin/quiz-flow?view=session-detail").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "validation_error");

    let (status, _, _) = get(&app, "/api/admin/quiz-flow?view=nope").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = get(&app, "/api/admin/quiz-flow?view=session-detail&session_id=missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_csv_export_is_an_attachment() {
    let (app, _) = app(true);
    let (status, headers, body) = get(&app, "/api/admin/quiz-flow?view=csv-export&days=30").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/csv"));
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"quiz-flow-all-30d-"));
    assert!(String::from_utf8(body).unwrap().starts_with("created_at,session_id,"));
}

#[tokio::test]
async fn test_track_then_report() {
    let (app, store) = app(false);
    let now = Utc::now().to_rfc3339();
    let event = |step: u32, kind: &str| {
        json!({
            "event_id": uuid_like(step, kind),
            "session_id": "live-1",
            "event_type": kind,
            "step_number": step,
            "category": "muscle",
            "timestamp": now,
        })
    };

    let batch = json!([event(0, "step_entered"), event(0, "step_exited"), event(1, "step_entered")]);
    let (status, body) = post_json(&app, "/api/funnel/track?source=quiz", batch).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], 3);

    let (status, body) = post_json(&app, "/api/funnel/track", event(2, "step_entered")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], 1);
    assert_eq!(store.step_event_count(), 4);

    let (status, _) = post_json(&app, "/api/funnel/track?source=ads", event(3, "step_entered")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, _, body) = get(&app, "/api/admin/quiz-flow?view=funnel&category=muscle").await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    let rows = json["funnel"]["muscle"].as_array().unwrap();
    assert_eq!(rows[0]["sessions"], 1);
    assert_eq!(rows[1]["sessions"], 1);
    // Funnel-sourced events are not quiz steps.
    assert_eq!(rows[2]["sessions"], 0);
}

#[tokio::test]
async fn test_guides_are_mounted() {
    let (app, _) = app(false);
    let (status, body) = post_json(
        &app,
        "/api/admin/guides/create-cluster",
        json!({ "topic": "Protein intake for men", "category": "muscle" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["slug"], "protein-intake-for-men");

    let (status, _, _) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
}

fn uuid_like(step: u32, kind: &str) -> String {
    let tag = if kind == "step_entered" { 1 } else { 2 };
    format!("00000000-0000-4000-8000-{:06}{:06}", tag, step)
}
