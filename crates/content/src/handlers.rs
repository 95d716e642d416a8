//! Guide endpoint handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use testograph_core::TestographError;
use tracing::warn;
use uuid::Uuid;

use crate::generator::ContentGenerator;
use crate::models::*;
use crate::store::GuideStore;

#[derive(Clone)]
pub struct ContentState {
    pub store: Arc<GuideStore>,
    pub generator: Arc<dyn ContentGenerator>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn reject(err: TestographError) -> ApiError {
    let (status, error) = match &err {
        TestographError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        TestographError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        TestographError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        TestographError::Generation(_) => (StatusCode::BAD_GATEWAY, "generation_failed"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    if status.is_server_error() {
        warn!(error = %err, "Guide request failed");
    }
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: err.to_string(),
        }),
    )
}

fn created(guide: Guide) -> (StatusCode, Json<Guide>) {
    let kind = match guide.guide_type {
        GuideType::Cluster => "cluster",
        GuideType::Pillar => "pillar",
    };
    metrics::counter!("content.guides.created", "guide_type" => kind).increment(1);
    (StatusCode::CREATED, Json(guide))
}

// ─── Generation ────────────────────────────────────────────────────────────

pub async fn create_cluster(
    State(state): State<ContentState>,
    Json(req): Json<CreateClusterRequest>,
) -> Result<(StatusCode, Json<Guide>), ApiError> {
    if req.topic.trim().is_empty() {
        return Err(reject(TestographError::Validation("topic is required".into())));
    }
    let slug = req.slug.unwrap_or_else(|| slugify(&req.topic));
    if state.store.slug_taken(&slug) {
        return Err(reject(TestographError::Conflict(format!("slug '{slug}' is already used"))));
    }

    let article = state
        .generator
        .generate_cluster(&req.topic, req.category, &req.keywords)
        .map_err(reject)?;

    state
        .store
        .create(CreateGuideRequest {
            title: article.title,
            slug: Some(slug),
            category: req.category,
            guide_type: GuideType::Cluster,
            parent_id: None,
            content: article.content,
            meta_description: article.meta_description,
            keywords: article.keywords,
            status: req.status,
        })
        .map(created)
        .map_err(reject)
}

pub async fn create_pillar(
    State(state): State<ContentState>,
    Json(req): Json<CreatePillarRequest>,
) -> Result<(StatusCode, Json<Guide>), ApiError> {
    if req.topic.trim().is_empty() {
        return Err(reject(TestographError::Validation("topic is required".into())));
    }
    let cluster = state.store.require_cluster(req.parent_id).map_err(reject)?;
    let slug = req.slug.unwrap_or_else(|| slugify(&req.topic));
    if state.store.slug_taken(&slug) {
        return Err(reject(TestographError::Conflict(format!("slug '{slug}' is already used"))));
    }

    let article = state
        .generator
        .generate_pillar(&cluster, &req.topic, &req.keywords)
        .map_err(reject)?;

    state
        .store
        .create(CreateGuideRequest {
            title: article.title,
            slug: Some(slug),
            category: cluster.category,
            guide_type: GuideType::Pillar,
            parent_id: Some(cluster.id),
            content: article.content,
            meta_description: article.meta_description,
            keywords: article.keywords,
            status: req.status,
        })
        .map(created)
        .map_err(reject)
}

pub async fn suggest_clusters(
    State(state): State<ContentState>,
    Json(req): Json<SuggestClustersRequest>,
) -> Result<Json<SuggestClustersResponse>, ApiError> {
    let existing = state.store.slugs(Some(req.category));
    let suggestions = state
        .generator
        .suggest_clusters(req.category, &existing, req.count)
        .map_err(reject)?;
    Ok(Json(SuggestClustersResponse {
        category: req.category,
        suggestions,
    }))
}

// ─── CRUD ──────────────────────────────────────────────────────────────────

pub async fn list_guides(
    State(state): State<ContentState>,
    Query(filter): Query<GuideFilter>,
) -> Json<Vec<Guide>> {
    Json(state.store.list(&filter))
}

pub async fn create_guide(
    State(state): State<ContentState>,
    Json(req): Json<CreateGuideRequest>,
) -> Result<(StatusCode, Json<Guide>), ApiError> {
    state.store.create(req).map(created).map_err(reject)
}

pub async fn get_guide(
    State(state): State<ContentState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Guide>, StatusCode> {
    state.store.get(id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

pub async fn update_guide(
    State(state): State<ContentState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateGuideRequest>,
) -> Result<Json<Guide>, ApiError> {
    state.store.update(id, req).map(Json).map_err(reject)
}

pub async fn delete_guide(
    State(state): State<ContentState>,
    Path(id): Path<Uuid>,
) -> StatusCode {
    if state.store.delete(id) {
        metrics::counter!("content.guides.deleted").increment(1);
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
