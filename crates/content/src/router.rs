//! Guide router: mounts the content endpoints under /api/admin/guides.

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::generator::{ContentGenerator, OutlineGenerator};
use crate::handlers::{self, ContentState};
use crate::store::GuideStore;

/// Build the content router. Returns a Router that should be merged into
/// the main app.
pub fn content_router(store: Arc<GuideStore>, generator: Arc<dyn ContentGenerator>) -> Router {
    let state = ContentState { store, generator };

    Router::new()
        // Generation
        .route("/api/admin/guides/create-cluster", post(handlers::create_cluster))
        .route("/api/admin/guides/create-pillar", post(handlers::create_pillar))
        .route("/api/admin/guides/suggest-clusters", post(handlers::suggest_clusters))
        // CRUD
        .route("/api/admin/guides", get(handlers::list_guides).post(handlers::create_guide))
        .route(
            "/api/admin/guides/:id",
            get(handlers::get_guide).put(handlers::update_guide).delete(handlers::delete_guide),
        )
        .with_state(state)
}

/// Content router over a fresh store and the built-in outline generator.
pub fn default_content_router() -> Router {
    content_router(Arc::new(GuideStore::new()), Arc::new(OutlineGenerator))
}
