//! Offer tiers shown on the final step, and the linear decline chain between
//! them.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use testograph_core::config::{OffersConfig, TierOfferConfig};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferTier {
    Premium,
    Single,
    Digital,
    Rejected,
}

impl OfferTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferTier::Premium => "premium",
            OfferTier::Single => "single",
            OfferTier::Digital => "digital",
            OfferTier::Rejected => "rejected",
        }
    }

    /// Whether a purchasable offer is on screen.
    pub fn is_offer(&self) -> bool {
        !matches!(self, OfferTier::Rejected)
    }
}

impl Default for OfferTier {
    fn default() -> Self {
        OfferTier::Premium
    }
}

impl fmt::Display for OfferTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes a single valid tier transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierTransition {
    pub from: OfferTier,
    pub to: OfferTier,
    pub trigger: String,
}

/// Guards the offer tier by enforcing the decline chain
/// `premium → single → digital → rejected` plus the skip-to-free exits.
/// There is no edge back to an earlier tier.
#[derive(Debug, Clone)]
pub struct OfferTierMachine {
    pub tier: OfferTier,
    pub transitions: Vec<TierTransition>,
}

impl OfferTierMachine {
    /// Creates a machine starting at `premium`.
    pub fn new() -> Self {
        Self::at(OfferTier::Premium)
    }

    /// Creates a machine positioned at a restored tier.
    pub fn at(tier: OfferTier) -> Self {
        let edge = |from, to, trigger: &str| TierTransition {
            from,
            to,
            trigger: trigger.to_string(),
        };
        let transitions = vec![
            edge(OfferTier::Premium, OfferTier::Single, "decline"),
            edge(OfferTier::Single, OfferTier::Digital, "decline"),
            edge(OfferTier::Digital, OfferTier::Rejected, "decline"),
            edge(OfferTier::Single, OfferTier::Rejected, "skip_to_free"),
            edge(OfferTier::Digital, OfferTier::Rejected, "skip_to_free"),
        ];
        Self { tier, transitions }
    }

    pub fn tier(&self) -> OfferTier {
        self.tier
    }

    pub fn is_terminal(&self) -> bool {
        self.tier == OfferTier::Rejected
    }

    fn target(&self, trigger: &str) -> Option<OfferTier> {
        self.transitions
            .iter()
            .find(|t| t.from == self.tier && t.trigger == trigger)
            .map(|t| t.to)
    }

    pub fn can_transition(&self, trigger: &str) -> bool {
        self.target(trigger).is_some()
    }

    fn fire(&mut self, trigger: &str) -> Result<OfferTier> {
        let to = self.target(trigger).ok_or_else(|| {
            anyhow!("Invalid tier transition '{}' from {:?}", trigger, self.tier)
        })?;
        self.tier = to;
        Ok(to)
    }

    /// Visitor declined the offer on screen.
    pub fn decline(&mut self) -> Result<OfferTier> {
        self.fire("decline")
    }

    /// Visitor jumped to the free plan from a downsell tier.
    pub fn skip_to_free(&mut self) -> Result<OfferTier> {
        self.fire("skip_to_free")
    }
}

impl Default for OfferTierMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Presentation data for one tier; rendered by the view model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferView {
    pub tier: OfferTier,
    pub name: String,
    pub price: f64,
    pub compare_at_price: f64,
    pub savings_percent: u32,
    pub currency: String,
    pub discount_code: String,
    pub features: Vec<String>,
    pub purchase_url: String,
}

/// Prices, bundles and outbound storefront links per tier.
#[derive(Debug, Clone)]
pub struct OfferCatalog {
    storefront: Url,
    currency: String,
    premium: TierOfferConfig,
    single: TierOfferConfig,
    digital: TierOfferConfig,
}

impl OfferCatalog {
    pub fn from_config(config: &OffersConfig) -> Result<Self> {
        let storefront = Url::parse(&config.storefront_url)
            .map_err(|e| anyhow!("invalid offers.storefront_url '{}': {}", config.storefront_url, e))?;
        Ok(Self {
            storefront,
            currency: config.currency.clone(),
            premium: config.premium.clone(),
            single: config.single.clone(),
            digital: config.digital.clone(),
        })
    }

    fn tier_config(&self, tier: OfferTier) -> Option<&TierOfferConfig> {
        match tier {
            OfferTier::Premium => Some(&self.premium),
            OfferTier::Single => Some(&self.single),
            OfferTier::Digital => Some(&self.digital),
            OfferTier::Rejected => None,
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn price(&self, tier: OfferTier) -> f64 {
        self.tier_config(tier).map_or(0.0, |c| c.price)
    }

    /// Storefront link carrying the tier and its discount code.
    pub fn purchase_url(&self, tier: OfferTier) -> Option<String> {
        let offer = self.tier_config(tier)?;
        let mut url = self.storefront.clone();
        url.query_pairs_mut()
            .append_pair("tier", tier.as_str())
            .append_pair("discount", &offer.discount_code);
        Some(url.into())
    }

    pub fn view(&self, tier: OfferTier) -> Option<OfferView> {
        let offer = self.tier_config(tier)?;
        let savings_percent = if offer.compare_at_price > offer.price && offer.compare_at_price > 0.0 {
            (((offer.compare_at_price - offer.price) / offer.compare_at_price) * 100.0).round() as u32
        } else {
            0
        };
        Some(OfferView {
            tier,
            name: offer.name.clone(),
            price: offer.price,
            compare_at_price: offer.compare_at_price,
            savings_percent,
            currency: self.currency.clone(),
            discount_code: offer.discount_code.clone(),
            features: offer.features.clone(),
            purchase_url: self.purchase_url(tier)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decline_chain_never_revisits() {
        let mut machine = OfferTierMachine::new();
        assert_eq!(machine.tier(), OfferTier::Premium);
        assert!(!machine.can_transition("skip_to_free"));

        assert_eq!(machine.decline().unwrap(), OfferTier::Single);
        assert_eq!(machine.decline().unwrap(), OfferTier::Digital);
        assert_eq!(machine.decline().unwrap(), OfferTier::Rejected);
        assert!(machine.is_terminal());

        assert!(machine.decline().is_err());
        assert!(machine.skip_to_free().is_err());
        assert_eq!(machine.tier(), OfferTier::Rejected);
    }

    #[test]
    fn test_no_edge_leads_back() {
        let machine = OfferTierMachine::new();
        let order = |t: OfferTier| match t {
            OfferTier::Premium => 0,
            OfferTier::Single => 1,
            OfferTier::Digital => 2,
            OfferTier::Rejected => 3,
        };
        assert!(machine.transitions.iter().all(|t| order(t.to) > order(t.from)));
    }

    #[test]
    fn test_skip_to_free_from_downsells() {
        let mut from_single = OfferTierMachine::at(OfferTier::Single);
        assert_eq!(from_single.skip_to_free().unwrap(), OfferTier::Rejected);

        let mut from_digital = OfferTierMachine::at(OfferTier::Digital);
        assert_eq!(from_digital.skip_to_free().unwrap(), OfferTier::Rejected);

        let mut from_premium = OfferTierMachine::new();
        assert!(from_premium.skip_to_free().is_err());
        assert_eq!(from_premium.tier(), OfferTier::Premium);
    }

    #[test]
    fn test_catalog_views() {
        let catalog = OfferCatalog::from_config(&OffersConfig::default()).unwrap();
        let premium = catalog.view(OfferTier::Premium).unwrap();
        assert_eq!(premium.savings_percent, 42);
        assert!(premium.purchase_url.contains("tier=premium"));
        assert!(premium.purchase_url.contains("discount=PROTOCOL40"));
        assert!(catalog.view(OfferTier::Rejected).is_none());
        assert!(catalog.price(OfferTier::Single) < catalog.price(OfferTier::Premium));
        assert!(catalog.price(OfferTier::Digital) < catalog.price(OfferTier::Single));
    }

    #[test]
    fn test_catalog_rejects_bad_storefront() {
        let config = OffersConfig {
            storefront_url: "not a url".to_string(),
            ..OffersConfig::default()
        };
        assert!(OfferCatalog::from_config(&config).is_err());
    }
}
