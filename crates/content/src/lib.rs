//! Content-management backend for the SEO guides: cluster and pillar
//! articles, their CRUD endpoints and the generator seam that drafts them.
//!
//! Guides live in a DashMap store; the default generator builds outlines
//! locally so the endpoints work without an external writing service.

pub mod generator;
pub mod handlers;
pub mod models;
pub mod router;
pub mod store;

pub use generator::{ContentGenerator, OutlineGenerator};
pub use handlers::ContentState;
pub use models::{Guide, GuideStatus, GuideType};
pub use router::{content_router, default_content_router};
pub use store::GuideStore;
