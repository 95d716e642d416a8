//! Scarcity and social-proof counters shown next to the offers. Cosmetic:
//! nothing downstream reads them.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use testograph_core::config::ScarcityConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuyerNotice {
    pub first_name: String,
    pub city: String,
    pub minutes_ago: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScarcityView {
    pub stock_left: u32,
    pub recent_buyers: Vec<BuyerNotice>,
}

#[derive(Debug, Clone)]
pub struct ScarcitySimulator {
    config: ScarcityConfig,
}

impl ScarcitySimulator {
    pub fn new(config: ScarcityConfig) -> Self {
        Self { config }
    }

    /// Units "left" after the visitor has spent `elapsed_secs` in the funnel.
    pub fn stock_left(&self, elapsed_secs: u64) -> u32 {
        let every = self.config.decrement_every_secs.max(1);
        let sold = u32::try_from(elapsed_secs / every).unwrap_or(u32::MAX);
        self.config
            .initial_stock
            .saturating_sub(sold)
            .max(self.config.stock_floor.min(self.config.initial_stock))
    }

    /// Same session, same buyers: the sequence is seeded from the session id.
    pub fn recent_buyers(&self, session_id: &str, count: usize) -> Vec<BuyerNotice> {
        if self.config.buyer_names.is_empty() || self.config.buyer_cities.is_empty() {
            return Vec::new();
        }
        let mut rng = StdRng::seed_from_u64(seed_for(session_id));

        let mut minutes_ago = 0u32;
        (0..count)
            .map(|_| {
                minutes_ago += rng.gen_range(2..=17);
                BuyerNotice {
                    first_name: self.config.buyer_names[rng.gen_range(0..self.config.buyer_names.len())].clone(),
                    city: self.config.buyer_cities[rng.gen_range(0..self.config.buyer_cities.len())].clone(),
                    minutes_ago,
                }
            })
            .collect()
    }

    pub fn view(&self, session_id: &str, elapsed_secs: u64) -> ScarcityView {
        ScarcityView {
            stock_left: self.stock_left(elapsed_secs),
            recent_buyers: self.recent_buyers(session_id, 3),
        }
    }
}

/// FNV-1a over the id bytes. Stable across builds and platforms.
fn seed_for(session_id: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    session_id
        .bytes()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME))
}
