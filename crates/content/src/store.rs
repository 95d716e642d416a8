//! In-memory guide store backed by DashMap.
//!
//! Slugs are unique across all guides. The slug index is claimed through
//! `DashMap::entry` so two concurrent creates cannot both win.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use testograph_core::types::QuizCategory;
use testograph_core::{TestographError, TestographResult};
use tracing::info;
use uuid::Uuid;

use crate::models::*;

pub struct GuideStore {
    guides: DashMap<Uuid, Guide>,
    slugs: DashMap<String, Uuid>,
}

impl Default for GuideStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GuideStore {
    pub fn new() -> Self {
        info!("Guide store initialized (in-memory)");
        Self {
            guides: DashMap::new(),
            slugs: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.guides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guides.is_empty()
    }

    /// Newest first.
    pub fn list(&self, filter: &GuideFilter) -> Vec<Guide> {
        let mut guides: Vec<Guide> = self
            .guides
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        guides.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.slug.cmp(&b.slug)));
        guides
    }

    pub fn get(&self, id: Uuid) -> Option<Guide> {
        self.guides.get(&id).map(|r| r.value().clone())
    }

    pub fn get_by_slug(&self, slug: &str) -> Option<Guide> {
        let id = *self.slugs.get(slug)?.value();
        self.get(id)
    }

    pub fn slug_taken(&self, slug: &str) -> bool {
        self.slugs.contains_key(slug)
    }

    pub fn slugs(&self, category: Option<QuizCategory>) -> Vec<String> {
        self.guides
            .iter()
            .filter(|r| category.map_or(true, |c| r.value().category == c))
            .map(|r| r.value().slug.clone())
            .collect()
    }

    pub fn create(&self, req: CreateGuideRequest) -> TestographResult<Guide> {
        let slug = normalize_slug(req.slug.as_deref(), &req.title)?;
        let parent_id = match req.guide_type {
            GuideType::Cluster => None,
            GuideType::Pillar => {
                let parent_id = req
                    .parent_id
                    .ok_or_else(|| TestographError::Validation("a pillar guide needs a parent_id".into()))?;
                self.require_cluster(parent_id)?;
                Some(parent_id)
            }
        };

        let now = Utc::now();
        let guide = Guide {
            id: Uuid::new_v4(),
            slug,
            title: req.title,
            category: req.category,
            guide_type: req.guide_type,
            parent_id,
            content: req.content,
            meta_description: req.meta_description,
            keywords: req.keywords,
            status: req.status,
            created_at: now,
            updated_at: now,
        };

        match self.slugs.entry(guide.slug.clone()) {
            Entry::Occupied(_) => return Err(slug_conflict(&guide.slug)),
            Entry::Vacant(v) => {
                v.insert(guide.id);
            }
        }
        self.guides.insert(guide.id, guide.clone());
        info!(id = %guide.id, slug = %guide.slug, guide_type = ?guide.guide_type, "Guide created");
        Ok(guide)
    }

    pub fn update(&self, id: Uuid, req: UpdateGuideRequest) -> TestographResult<Guide> {
        let mut entry = self
            .guides
            .get_mut(&id)
            .ok_or_else(|| TestographError::NotFound(format!("guide {id}")))?;
        let guide = entry.value_mut();

        if let Some(requested) = req.slug {
            let slug = normalize_slug(Some(&requested), &guide.title)?;
            if slug != guide.slug {
                match self.slugs.entry(slug.clone()) {
                    Entry::Occupied(_) => return Err(slug_conflict(&slug)),
                    Entry::Vacant(v) => {
                        v.insert(id);
                    }
                }
                self.slugs.remove(&guide.slug);
                guide.slug = slug;
            }
        }
        if let Some(title) = req.title {
            guide.title = title;
        }
        if let Some(content) = req.content {
            guide.content = content;
        }
        if let Some(meta) = req.meta_description {
            guide.meta_description = meta;
        }
        if let Some(keywords) = req.keywords {
            guide.keywords = keywords;
        }
        if let Some(status) = req.status {
            guide.status = status;
        }
        guide.updated_at = Utc::now();
        Ok(guide.clone())
    }

    /// Deleting a cluster also deletes its pillars.
    pub fn delete(&self, id: Uuid) -> bool {
        let Some((_, guide)) = self.guides.remove(&id) else {
            return false;
        };
        self.slugs.remove(&guide.slug);
        if guide.guide_type == GuideType::Cluster {
            let pillars: Vec<Uuid> = self
                .guides
                .iter()
                .filter(|r| r.value().parent_id == Some(id))
                .map(|r| *r.key())
                .collect();
            for pillar in pillars {
                if let Some((_, p)) = self.guides.remove(&pillar) {
                    self.slugs.remove(&p.slug);
                }
            }
        }
        info!(id = %id, slug = %guide.slug, "Guide deleted");
        true
    }

    pub fn require_cluster(&self, id: Uuid) -> TestographResult<Guide> {
        match self.get(id) {
            Some(g) if g.guide_type == GuideType::Cluster => Ok(g),
            Some(_) => Err(TestographError::Validation(format!("guide {id} is not a cluster"))),
            None => Err(TestographError::NotFound(format!("cluster guide {id}"))),
        }
    }
}

fn normalize_slug(requested: Option<&str>, title: &str) -> TestographResult<String> {
    let slug = slugify(requested.unwrap_or(title));
    if slug.is_empty() {
        return Err(TestographError::Validation(
            "slug must contain at least one ASCII letter or digit".into(),
        ));
    }
    Ok(slug)
}

fn slug_conflict(slug: &str) -> TestographError {
    TestographError::Conflict(format!("slug '{slug}' is already used"))
}
