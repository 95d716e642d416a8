//! Guide domain types and request bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use testograph_core::types::QuizCategory;
use uuid::Uuid;

// ─── Guide ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guide {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub category: QuizCategory,
    pub guide_type: GuideType,
    /// Cluster a pillar belongs to. Always `None` for clusters.
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub meta_description: String,
    pub keywords: Vec<String>,
    pub status: GuideStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GuideType {
    Cluster,
    Pillar,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GuideStatus {
    #[default]
    Draft,
    Published,
}

/// Article body as returned by a generator, before it becomes a stored guide.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedArticle {
    pub title: String,
    pub content: String,
    pub meta_description: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSuggestion {
    pub topic: String,
    pub slug: String,
    pub keywords: Vec<String>,
}

/// Lowercase ASCII slug; runs of anything else collapse into a single `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

// ─── Requests ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CreateClusterRequest {
    pub topic: String,
    pub category: QuizCategory,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub status: GuideStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePillarRequest {
    pub parent_id: Uuid,
    pub topic: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub status: GuideStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuggestClustersRequest {
    pub category: QuizCategory,
    #[serde(default = "default_suggestion_count")]
    pub count: usize,
}

fn default_suggestion_count() -> usize {
    5
}

/// Manual guide creation without the generator.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateGuideRequest {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    pub category: QuizCategory,
    pub guide_type: GuideType,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub status: GuideStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateGuideRequest {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub meta_description: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub status: Option<GuideStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GuideFilter {
    pub category: Option<QuizCategory>,
    pub guide_type: Option<GuideType>,
    pub status: Option<GuideStatus>,
    pub parent_id: Option<Uuid>,
}

impl GuideFilter {
    pub fn matches(&self, guide: &Guide) -> bool {
        self.category.map_or(true, |c| guide.category == c)
            && self.guide_type.map_or(true, |t| guide.guide_type == t)
            && self.status.map_or(true, |s| guide.status == s)
            && self.parent_id.map_or(true, |p| guide.parent_id == Some(p))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestClustersResponse {
    pub category: QuizCategory,
    pub suggestions: Vec<ClusterSuggestion>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Low Energy After 40?"), "low-energy-after-40");
        assert_eq!(slugify("  --Zinc & Vitamin D--  "), "zinc-vitamin-d");
        assert_eq!(slugify("Енергия"), "");
    }

    #[test]
    fn test_guide_type_wire_name() {
        assert_eq!(serde_json::to_string(&GuideType::Pillar).unwrap(), "\"pillar\"");
        assert_eq!(serde_json::to_string(&GuideStatus::default()).unwrap(), "\"draft\"");
    }
}
