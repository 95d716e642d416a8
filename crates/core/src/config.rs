use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `TESTOGRAPH__`, layered over an optional
/// `testograph.toml` in the working directory.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub funnel: FunnelConfig,
    #[serde(default)]
    pub offers: OffersConfig,
    #[serde(default)]
    pub scarcity: ScarcityConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_enabled() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            funnel: FunnelConfig::default(),
            offers: OffersConfig::default(),
            scarcity: ScarcityConfig::default(),
            reporting: ReportingConfig::default(),
        }
    }
}

// ─── Funnel Config ──────────────────────────────────────────────────────────

/// Timing and progress parameters of the result funnel. These are tuned
/// marketing values, not derived from anything.
#[derive(Debug, Clone, Deserialize)]
pub struct FunnelConfig {
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    /// Auto-advance timer for steps 1..=7, indexed from step 1.
    #[serde(default = "default_step_timers_ms")]
    pub step_timers_ms: Vec<u64>,
    /// Progress value reached when leaving steps 1..=8.
    #[serde(default = "default_progress_targets")]
    pub progress_targets: Vec<f64>,
    #[serde(default = "default_ramp_tick_ms")]
    pub ramp_tick_ms: u64,
    #[serde(default = "default_ramp_increment")]
    pub ramp_increment: f64,
    #[serde(default = "default_ramp_buffer")]
    pub ramp_buffer: f64,
    #[serde(default = "default_catch_up_tick_ms")]
    pub catch_up_tick_ms: u64,
    #[serde(default = "default_catch_up_increment")]
    pub catch_up_increment: f64,
    #[serde(default = "default_skip_available_after_ms")]
    pub skip_available_after_ms: u64,
    #[serde(default = "default_skip_max_step")]
    pub skip_max_step: u8,
    #[serde(default = "default_exit_intent_top_px")]
    pub exit_intent_top_px: f64,
    #[serde(default)]
    pub dev_mode: bool,
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
}

fn default_storage_key() -> String { "testograph_funnel_progress".to_string() }
fn default_session_ttl_hours() -> i64 { 24 }
fn default_step_timers_ms() -> Vec<u64> { vec![16_000, 12_000, 14_000, 15_000, 18_000, 22_000, 10_000] }
fn default_progress_targets() -> Vec<f64> { vec![12.0, 25.0, 37.0, 50.0, 62.0, 75.0, 87.0, 98.0] }
fn default_ramp_tick_ms() -> u64 { 200 }
fn default_ramp_increment() -> f64 { 0.5 }
fn default_ramp_buffer() -> f64 { 3.0 }
fn default_catch_up_tick_ms() -> u64 { 40 }
fn default_catch_up_increment() -> f64 { 2.5 }
fn default_skip_available_after_ms() -> u64 { 6_000 }
fn default_skip_max_step() -> u8 { 3 }
fn default_exit_intent_top_px() -> f64 { 10.0 }
fn default_storage_dir() -> String { ".testograph".to_string() }

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            storage_key: default_storage_key(),
            session_ttl_hours: default_session_ttl_hours(),
            step_timers_ms: default_step_timers_ms(),
            progress_targets: default_progress_targets(),
            ramp_tick_ms: default_ramp_tick_ms(),
            ramp_increment: default_ramp_increment(),
            ramp_buffer: default_ramp_buffer(),
            catch_up_tick_ms: default_catch_up_tick_ms(),
            catch_up_increment: default_catch_up_increment(),
            skip_available_after_ms: default_skip_available_after_ms(),
            skip_max_step: default_skip_max_step(),
            exit_intent_top_px: default_exit_intent_top_px(),
            dev_mode: false,
            storage_dir: default_storage_dir(),
        }
    }
}

impl FunnelConfig {
    /// Checks the lookup tables cover every micro-step and that targets rise.
    pub fn validate(&self) -> Result<(), String> {
        if self.step_timers_ms.len() != 7 {
            return Err(format!(
                "funnel.step_timers_ms needs 7 entries, got {}",
                self.step_timers_ms.len()
            ));
        }
        if self.progress_targets.len() != 8 {
            return Err(format!(
                "funnel.progress_targets needs 8 entries, got {}",
                self.progress_targets.len()
            ));
        }
        if self.progress_targets.windows(2).any(|w| w[1] < w[0]) {
            return Err("funnel.progress_targets must be non-decreasing".to_string());
        }
        if self.progress_targets.iter().any(|t| !(0.0..=100.0).contains(t)) {
            return Err("funnel.progress_targets must lie within 0..=100".to_string());
        }
        if self.ramp_tick_ms == 0 || self.catch_up_tick_ms == 0 {
            return Err("funnel tick intervals must be non-zero".to_string());
        }
        Ok(())
    }
}

// ─── Offers Config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct TierOfferConfig {
    pub name: String,
    pub price: f64,
    pub compare_at_price: f64,
    pub discount_code: String,
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OffersConfig {
    #[serde(default = "default_storefront_url")]
    pub storefront_url: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_premium_offer")]
    pub premium: TierOfferConfig,
    #[serde(default = "default_single_offer")]
    pub single: TierOfferConfig,
    #[serde(default = "default_digital_offer")]
    pub digital: TierOfferConfig,
}

fn default_storefront_url() -> String { "https://shop.testograph.eu/cart".to_string() }
fn default_currency() -> String { "EUR".to_string() }

fn default_premium_offer() -> TierOfferConfig {
    TierOfferConfig {
        name: "TestoUp 3-month protocol".to_string(),
        price: 97.0,
        compare_at_price: 167.0,
        discount_code: "PROTOCOL40".to_string(),
        features: vec![
            "3 bottles TestoUp".to_string(),
            "Personal 90-day plan".to_string(),
            "Nutrition and training guide".to_string(),
            "Private coaching chat".to_string(),
        ],
    }
}

fn default_single_offer() -> TierOfferConfig {
    TierOfferConfig {
        name: "TestoUp 1-month starter".to_string(),
        price: 47.0,
        compare_at_price: 67.0,
        discount_code: "START30".to_string(),
        features: vec![
            "1 bottle TestoUp".to_string(),
            "Personal 30-day plan".to_string(),
        ],
    }
}

fn default_digital_offer() -> TierOfferConfig {
    TierOfferConfig {
        name: "Digital 30-day plan".to_string(),
        price: 17.0,
        compare_at_price: 37.0,
        discount_code: "PLAN50".to_string(),
        features: vec![
            "Personal 30-day plan".to_string(),
            "Nutrition and training guide".to_string(),
        ],
    }
}

impl Default for OffersConfig {
    fn default() -> Self {
        Self {
            storefront_url: default_storefront_url(),
            currency: default_currency(),
            premium: default_premium_offer(),
            single: default_single_offer(),
            digital: default_digital_offer(),
        }
    }
}

// ─── Scarcity Config ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ScarcityConfig {
    #[serde(default = "default_initial_stock")]
    pub initial_stock: u32,
    #[serde(default = "default_stock_floor")]
    pub stock_floor: u32,
    #[serde(default = "default_decrement_every_secs")]
    pub decrement_every_secs: u64,
    #[serde(default = "default_buyer_names")]
    pub buyer_names: Vec<String>,
    #[serde(default = "default_buyer_cities")]
    pub buyer_cities: Vec<String>,
}

fn default_initial_stock() -> u32 { 47 }
fn default_stock_floor() -> u32 { 7 }
fn default_decrement_every_secs() -> u64 { 40 }
fn default_buyer_names() -> Vec<String> {
    ["Georgi", "Ivan", "Dimitar", "Nikolay", "Petar", "Stefan", "Martin", "Aleksandar"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_buyer_cities() -> Vec<String> {
    ["Sofia", "Plovdiv", "Varna", "Burgas", "Ruse", "Stara Zagora"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ScarcityConfig {
    fn default() -> Self {
        Self {
            initial_stock: default_initial_stock(),
            stock_floor: default_stock_floor(),
            decrement_every_secs: default_decrement_every_secs(),
            buyer_names: default_buyer_names(),
            buyer_cities: default_buyer_cities(),
        }
    }
}

// ─── Reporting Config ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ReportingConfig {
    #[serde(default)]
    pub seed_demo_data: bool,
    #[serde(default = "default_days")]
    pub default_days: i64,
    #[serde(default = "default_max_days")]
    pub max_days: i64,
    #[serde(default = "default_page_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    /// Highest quiz step number tracked by the funnel view (inclusive).
    #[serde(default = "default_quiz_last_step")]
    pub quiz_last_step: u32,
}

fn default_days() -> i64 { 7 }
fn default_max_days() -> i64 { 365 }
fn default_page_limit() -> usize { 50 }
fn default_max_limit() -> usize { 500 }
fn default_quiz_last_step() -> u32 { 24 }

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            seed_demo_data: false,
            default_days: default_days(),
            max_days: default_max_days(),
            default_limit: default_page_limit(),
            max_limit: default_max_limit(),
            quiz_last_step: default_quiz_last_step(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and optional config file.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("testograph").required(false))
            .add_source(
                config::Environment::with_prefix("TESTOGRAPH")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config
            .funnel
            .validate()
            .map_err(config::ConfigError::Message)?;
        Ok(config)
    }
}
