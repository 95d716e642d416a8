//! Deterministic demo data so the dashboard has something to show on a
//! fresh install.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use testograph_core::event_bus::make_event;
use testograph_core::types::{EventType, QuizCategory};
use tracing::info;
use uuid::Uuid;

use crate::models::{EventSource, OrderStatus, PendingOrder, QuizCompletion};
use crate::store::QuizFlowStore;

const FIRST_NAMES: [&str; 8] = ["Georgi", "Ivan", "Dimitar", "Nikolay", "Petar", "Stefan", "Martin", "Aleksandar"];
const TIERS: [(&str, f64); 3] = [("premium", 97.0), ("single", 47.0), ("digital", 17.0)];

/// Populate the store with `per_category` quiz sessions per category spread
/// over the last two weeks. The same seed always yields the same sessions.
pub fn seed_demo_data(store: &QuizFlowStore, now: DateTime<Utc>, per_category: usize, last_step: u32, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut sessions = 0usize;

    for category in QuizCategory::ALL {
        for _ in 0..per_category {
            sessions += 1;
            let session_id = format!("demo-{}", Uuid::from_u128(rng.gen()));
            let mut at = now - Duration::minutes(rng.gen_range(60..14 * 24 * 60));

            let mut reached = 0;
            for step in 0..=last_step {
                let spent = rng.gen_range(3..25u64);
                store.record(
                    make_event(EventType::StepEntered, session_id.clone(), step, at).with_category(Some(category)),
                    EventSource::Quiz,
                );
                store.record(
                    make_event(EventType::AnswerSelected, session_id.clone(), step, at + Duration::seconds(spent as i64 - 1))
                        .with_category(Some(category))
                        .with_metadata(serde_json::json!({ "answer": rng.gen_range(0..4) })),
                    EventSource::Quiz,
                );
                at = at + Duration::seconds(spent as i64);
                store.record(
                    make_event(EventType::StepExited, session_id.clone(), step, at)
                        .with_category(Some(category))
                        .with_time_spent(spent),
                    EventSource::Quiz,
                );
                reached = step;
                if step < last_step && rng.gen_bool(0.06) {
                    break;
                }
            }

            if reached < last_step {
                continue;
            }

            let first_name = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
            let email = format!("{}.{}@example.com", first_name.to_lowercase(), rng.gen_range(100..1000));
            let total_score = rng.gen_range(20..95);
            let level = match total_score {
                0..=39 => "low",
                40..=69 => "moderate",
                _ => "optimal",
            };
            store.record(
                make_event(EventType::QuizCompleted, session_id.clone(), last_step, at).with_category(Some(category)),
                EventSource::Quiz,
            );
            store.insert_completion(QuizCompletion {
                id: Uuid::from_u128(rng.gen()),
                session_id: session_id.clone(),
                category,
                first_name: Some(first_name.to_string()),
                email: Some(email.clone()),
                phone: rng.gen_bool(0.4).then(|| format!("+3598{}", rng.gen_range(10_000_000..99_999_999))),
                age: Some(rng.gen_range(28..65)),
                total_score,
                level: level.to_string(),
                created_at: at,
            });

            seed_result_funnel(store, &mut rng, &session_id, category, &email, first_name, at);
        }
    }

    info!(
        sessions,
        completions = store.completion_count(),
        orders = store.order_count(),
        "Demo quiz-flow data seeded"
    );
}

fn seed_result_funnel(
    store: &QuizFlowStore,
    rng: &mut StdRng,
    session_id: &str,
    category: QuizCategory,
    email: &str,
    first_name: &str,
    mut at: DateTime<Utc>,
) {
    let event = |t: EventType, step: u32, at: DateTime<Utc>| {
        make_event(t, session_id.to_string(), step, at).with_category(Some(category))
    };

    for step in 1..=8u32 {
        store.record(event(EventType::StepEntered, step, at), EventSource::Funnel);
        if step == 8 {
            break;
        }
        let spent = rng.gen_range(6..22u64);
        at = at + Duration::seconds(spent as i64);
        store.record(event(EventType::StepExited, step, at).with_time_spent(spent), EventSource::Funnel);
        if rng.gen_bool(0.04) {
            return;
        }
    }

    for (i, (tier, price)) in TIERS.iter().enumerate() {
        at = at + Duration::seconds(rng.gen_range(20..120));
        if rng.gen_bool(0.3) {
            store.record(
                event(EventType::OfferClicked, 8, at).with_metadata(serde_json::json!({ "tier": tier, "price": price })),
                EventSource::Funnel,
            );
            store.record(
                event(EventType::FunnelExit, 8, at).with_metadata(serde_json::json!({ "reason": "purchase", "tier": tier })),
                EventSource::Funnel,
            );
            store.insert_order(PendingOrder {
                id: Uuid::from_u128(rng.gen()),
                session_id: Some(session_id.to_string()),
                email: email.to_string(),
                first_name: Some(first_name.to_string()),
                category: Some(category),
                tier: tier.to_string(),
                total: *price,
                currency: "EUR".into(),
                status: if rng.gen_bool(0.7) { OrderStatus::Paid } else { OrderStatus::Pending },
                created_at: at,
            });
            return;
        }
        let to = TIERS.get(i + 1).map_or("rejected", |(t, _)| *t);
        store.record(
            event(EventType::OfferTierChanged, 8, at)
                .with_metadata(serde_json::json!({ "from": tier, "to": to, "trigger": "decline" })),
            EventSource::Funnel,
        );
    }
    store.record(
        event(EventType::FunnelExit, 8, at).with_metadata(serde_json::json!({ "reason": "declined", "lead": true })),
        EventSource::Funnel,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_deterministic() {
        let now = Utc::now();
        let a = QuizFlowStore::new();
        let b = QuizFlowStore::new();
        seed_demo_data(&a, now, 20, 24, 7);
        seed_demo_data(&b, now, 20, 24, 7);
        assert_eq!(a.step_event_count(), b.step_event_count());
        assert_eq!(a.completion_count(), b.completion_count());
        assert!(a.completion_count() > 0);
        assert!(a.step_event_count() > 60 * 3);
    }
}
