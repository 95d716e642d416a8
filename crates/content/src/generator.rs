//! Article generation seam.
//!
//! `ContentGenerator` is what the handlers call to draft cluster and pillar
//! guides. `OutlineGenerator` is the built-in implementation: it assembles a
//! markdown outline from the topic and keywords, so two calls with the same
//! input always produce the same article.

use testograph_core::types::QuizCategory;
use testograph_core::{TestographError, TestographResult};

use crate::models::{slugify, ClusterSuggestion, GeneratedArticle, Guide};

pub const MAX_SUGGESTIONS: usize = 10;

pub trait ContentGenerator: Send + Sync {
    fn generate_cluster(
        &self,
        topic: &str,
        category: QuizCategory,
        keywords: &[String],
    ) -> TestographResult<GeneratedArticle>;

    /// Draft a pillar article that sits under `cluster`.
    fn generate_pillar(&self, cluster: &Guide, topic: &str, keywords: &[String]) -> TestographResult<GeneratedArticle>;

    /// Cluster topics for `category` whose slug is not in `existing_slugs`.
    fn suggest_clusters(
        &self,
        category: QuizCategory,
        existing_slugs: &[String],
        count: usize,
    ) -> TestographResult<Vec<ClusterSuggestion>>;
}

#[derive(Debug, Clone, Default)]
pub struct OutlineGenerator;

fn topic_bank(category: QuizCategory) -> &'static [(&'static str, [&'static str; 2])] {
    match category {
        QuizCategory::Energy => &[
            ("Afternoon energy crashes", ["energy crash", "blood sugar"]),
            ("Sleep quality and testosterone", ["deep sleep", "testosterone"]),
            ("Morning fatigue in men over 40", ["fatigue", "men over 40"]),
            ("Vitamin D and daily energy", ["vitamin d", "energy"]),
            ("Caffeine dependence", ["caffeine", "adrenal"]),
            ("Stress and cortisol", ["cortisol", "stress"]),
            ("Training without burnout", ["overtraining", "recovery"]),
        ],
        QuizCategory::Libido => &[
            ("Low libido causes", ["low libido", "testosterone"]),
            ("Zinc and sexual health", ["zinc", "libido"]),
            ("Stress and desire", ["stress", "desire"]),
            ("Alcohol and hormones", ["alcohol", "hormones"]),
            ("Morning erections as a health signal", ["morning erection", "vascular health"]),
            ("Relationship habits that help", ["relationship", "intimacy"]),
        ],
        QuizCategory::Muscle => &[
            ("Building muscle after 40", ["muscle after 40", "strength training"]),
            ("Protein intake for men", ["protein", "muscle growth"]),
            ("Recovery between workouts", ["recovery", "rest days"]),
            ("Belly fat and estrogen", ["belly fat", "estrogen"]),
            ("Compound lifts for hormones", ["compound lifts", "testosterone"]),
            ("Creatine basics", ["creatine", "performance"]),
            ("Sleep and muscle repair", ["sleep", "muscle repair"]),
        ],
    }
}

fn require_topic(topic: &str) -> TestographResult<&str> {
    let topic = topic.trim();
    if topic.is_empty() {
        return Err(TestographError::Generation("topic is empty".into()));
    }
    Ok(topic)
}

fn merge_keywords(topic: &str, keywords: &[String]) -> Vec<String> {
    let mut merged = vec![topic.to_lowercase()];
    for k in keywords {
        let k = k.trim().to_lowercase();
        if !k.is_empty() && !merged.contains(&k) {
            merged.push(k);
        }
    }
    merged
}

fn meta_description(text: String) -> String {
    if text.chars().count() <= 160 {
        return text;
    }
    let mut cut: String = text.chars().take(157).collect();
    cut.push_str("...");
    cut
}

impl ContentGenerator for OutlineGenerator {
    fn generate_cluster(
        &self,
        topic: &str,
        category: QuizCategory,
        keywords: &[String],
    ) -> TestographResult<GeneratedArticle> {
        let topic = require_topic(topic)?;
        let keywords = merge_keywords(topic, keywords);

        let mut content = format!("# {topic}\n\n");
        content.push_str(&format!(
            "A practical overview of {} for men who took the {category} assessment.\n\n",
            topic.to_lowercase()
        ));
        for (i, section) in ["What it is", "Common causes", "What you can change", "When to see a doctor"]
            .iter()
            .enumerate()
        {
            content.push_str(&format!("## {}. {section}\n\n", i + 1));
        }
        content.push_str("## Related topics\n\n");
        for k in keywords.iter().skip(1) {
            content.push_str(&format!("- {k}\n"));
        }

        Ok(GeneratedArticle {
            title: topic.to_string(),
            meta_description: meta_description(format!(
                "{topic}: causes, practical changes and when to get tested. Part of the {category} guide series."
            )),
            content,
            keywords,
        })
    }

    fn generate_pillar(&self, cluster: &Guide, topic: &str, keywords: &[String]) -> TestographResult<GeneratedArticle> {
        let topic = require_topic(topic)?;
        let keywords = merge_keywords(topic, keywords);

        let mut content = format!("# {topic}\n\n");
        content.push_str(&format!("Part of [{}](/guides/{}).\n\n", cluster.title, cluster.slug));
        for section in ["Key facts", "Step-by-step plan", "Frequently asked questions"] {
            content.push_str(&format!("## {section}\n\n"));
        }

        Ok(GeneratedArticle {
            title: topic.to_string(),
            meta_description: meta_description(format!("{topic}. A focused guide from the {} series.", cluster.title)),
            content,
            keywords,
        })
    }

    fn suggest_clusters(
        &self,
        category: QuizCategory,
        existing_slugs: &[String],
        count: usize,
    ) -> TestographResult<Vec<ClusterSuggestion>> {
        Ok(topic_bank(category)
            .iter()
            .map(|(topic, keywords)| ClusterSuggestion {
                topic: topic.to_string(),
                slug: slugify(topic),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
            })
            .filter(|s| !existing_slugs.contains(&s.slug))
            .take(count.min(MAX_SUGGESTIONS))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GuideStatus, GuideType};
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_cluster_is_deterministic() {
        let g = OutlineGenerator;
        let kw = vec!["Fatigue".to_string(), "fatigue".to_string(), " ".to_string()];
        let a = g.generate_cluster("Morning Fatigue", QuizCategory::Energy, &kw).unwrap();
        let b = g.generate_cluster("Morning Fatigue", QuizCategory::Energy, &kw).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.keywords, vec!["morning fatigue", "fatigue"]);
        assert!(a.content.starts_with("# Morning Fatigue\n"));
        assert!(a.meta_description.chars().count() <= 160);
    }

    #[test]
    fn test_blank_topic_is_rejected() {
        let err = OutlineGenerator.generate_cluster("   ", QuizCategory::Muscle, &[]).unwrap_err();
        assert!(matches!(err, TestographError::Generation(_)));
    }

    #[test]
    fn test_pillar_links_back_to_cluster() {
        let now = Utc::now();
        let cluster = Guide {
            id: Uuid::new_v4(),
            slug: "zinc-and-sexual-health".into(),
            title: "Zinc and sexual health".into(),
            category: QuizCategory::Libido,
            guide_type: GuideType::Cluster,
            parent_id: None,
            content: String::new(),
            meta_description: String::new(),
            keywords: vec![],
            status: GuideStatus::Published,
            created_at: now,
            updated_at: now,
        };
        let pillar = OutlineGenerator.generate_pillar(&cluster, "Zinc dosage", &[]).unwrap();
        assert!(pillar.content.contains("(/guides/zinc-and-sexual-health)"));
    }

    #[test]
    fn test_suggestions_skip_existing() {
        let existing = vec!["low-libido-causes".to_string()];
        let s = OutlineGenerator.suggest_clusters(QuizCategory::Libido, &existing, 3).unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(s[0].slug, "zinc-and-sexual-health");
        assert!(s.iter().all(|x| x.slug != "low-libido-causes"));

        let all = OutlineGenerator.suggest_clusters(QuizCategory::Muscle, &[], 50).unwrap();
        assert_eq!(all.len(), 7);
    }
}
