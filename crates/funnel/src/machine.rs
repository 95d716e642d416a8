//! Funnel state machine.
//!
//! - **State**: where the visitor is (`FunnelState`, with `Phase` as the
//!   tagged union of timer states)
//! - **Events**: what happened (`FunnelEvent`)
//! - **Effects**: what to do about it (`Effect`)
//! - **Transition**: `(FunnelState, FunnelEvent, now) -> (FunnelState, Vec<Effect>)`
//!
//! Timers are deadlines held in the phase. Every event first replays the
//! deadlines that fell due before `now`, in order, so a simulated clock gives
//! the same result as real timers.

use serde::Serialize;
use testograph_core::config::AppConfig;
use testograph_core::event_bus::make_event;
use testograph_core::types::{AnalyticsEvent, EventType, QuizCategory};
use testograph_core::{TestographError, TestographResult};
use tracing::debug;

use crate::clock::from_ms;
use crate::exit_intent::ExitIntentLatch;
use crate::offer::{OfferCatalog, OfferTier, OfferTierMachine};
use crate::persistence::{FunnelSnapshot, UserData};
use crate::pixel::PixelEvent;
use crate::progress::ProgressSimulator;
use crate::sequencer::{AdvanceReason, Step, StepPolicy, CHOICE_COUNT};

/// How a finished funnel ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Outcome {
    /// Clicked through to the storefront.
    Purchased { tier: OfferTier },
    /// Left without buying and got the free plan.
    FreePlan { reason: ExitReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Declined,
    SkipToFree,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Declined => "declined",
            ExitReason::SkipToFree => "skip_to_free",
        }
    }
}

/// Timer state of the funnel. Deadlines are epoch milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    /// Built but not mounted; no timers run.
    Pending,
    /// Steps 1..=7: idle ramp plus the auto-advance deadline.
    Sequencing { advance_at: i64, next_ramp_at: i64 },
    /// Skip pressed: fast ramp to the target, then advance.
    CatchingUp { next_tick_at: i64 },
    /// Step 8: offers on screen, ramp only.
    Offering { next_ramp_at: i64 },
    Finished(Outcome),
    /// Torn down before finishing; every timer is cancelled.
    Unmounted,
}

impl Phase {
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            Phase::Sequencing { .. } | Phase::CatchingUp { .. } | Phase::Offering { .. }
        )
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Phase::Finished(_))
    }
}

/// Everything the funnel knows about one visitor.
#[derive(Debug, Clone)]
pub struct FunnelState {
    pub session_id: String,
    pub category: Option<QuizCategory>,
    pub step: Step,
    pub progress: f64,
    pub offer: OfferTierMachine,
    pub user_choice: Option<u8>,
    pub user_data: UserData,
    pub phase: Phase,
    pub restored: bool,
    pub started_at: i64,
    /// Seeds the recent-buyer ticker. Carried over from the first visit on restore.
    pub scarcity_seed: String,
    pub step_entered_at: i64,
    pub exit_intent: ExitIntentLatch,
    pub downsell_open: bool,
}

impl FunnelState {
    pub fn tier(&self) -> OfferTier {
        self.offer.tier()
    }

    pub fn snapshot(&self, now_ms: i64) -> FunnelSnapshot {
        FunnelSnapshot {
            current_step: self.step,
            progress: self.progress,
            current_offer_tier: Some(self.offer.tier()),
            user_choice: self.user_choice,
            user_data: self.user_data.clone(),
            timestamp: now_ms,
            started_at: Some(self.started_at),
            scarcity_seed: Some(self.scarcity_seed.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunnelEvent {
    Mount,
    Tick,
    Proceed,
    Skip,
    SelectChoice(u8),
    Back,
    Decline,
    SkipToFree,
    OfferClicked,
    PointerLeave { client_y: f64 },
    DismissDownsell,
    PageHidden,
    Unmount,
    DevRewind(Step),
}

/// Side effects as data; [`crate::orchestrator::FunnelOrchestrator`]
/// executes them in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Track(AnalyticsEvent),
    Pixel(PixelEvent),
    /// Write the post-transition snapshot.
    Persist,
    ClearPersisted,
    ScrollToTop,
    OpenDownsell { tier: OfferTier },
    Redirect { url: String },
}

impl Effect {
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::Track(_) => "track",
            Effect::Pixel(_) => "pixel",
            Effect::Persist => "persist",
            Effect::ClearPersisted => "clear_persisted",
            Effect::ScrollToTop => "scroll_to_top",
            Effect::OpenDownsell { .. } => "open_downsell",
            Effect::Redirect { .. } => "redirect",
        }
    }
}

/// Result of a transition: the new state and the effects to run.
#[derive(Debug, Clone)]
pub struct TransitionResult {
    pub state: FunnelState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: FunnelState, effects: Vec<Effect>) -> Self {
        Self { state, effects }
    }

    pub fn unchanged(state: FunnelState) -> Self {
        Self::new(state, Vec::new())
    }
}

/// Constants the transition function consults.
#[derive(Debug, Clone)]
pub struct FunnelRules {
    pub policy: StepPolicy,
    pub progress: ProgressSimulator,
    pub catalog: OfferCatalog,
    pub ramp_tick_ms: i64,
    pub catch_up_tick_ms: i64,
    pub exit_intent_top_px: f64,
    pub dev_mode: bool,
}

#[derive(Debug, Clone)]
pub struct FunnelMachine {
    rules: FunnelRules,
}

impl FunnelMachine {
    pub fn from_config(config: &AppConfig) -> TestographResult<Self> {
        config.funnel.validate().map_err(TestographError::Config)?;
        let catalog = OfferCatalog::from_config(&config.offers)
            .map_err(|e| TestographError::Config(e.to_string()))?;
        let to_ms = |v: u64| i64::try_from(v).unwrap_or(i64::MAX);
        Ok(Self {
            rules: FunnelRules {
                policy: StepPolicy::from_config(&config.funnel),
                progress: ProgressSimulator::from_config(&config.funnel),
                catalog,
                ramp_tick_ms: to_ms(config.funnel.ramp_tick_ms),
                catch_up_tick_ms: to_ms(config.funnel.catch_up_tick_ms),
                exit_intent_top_px: config.funnel.exit_intent_top_px,
                dev_mode: config.funnel.dev_mode,
            },
        })
    }

    pub fn rules(&self) -> &FunnelRules {
        &self.rules
    }

    /// New visitor at step 1 with an empty bar and the premium offer queued.
    pub fn fresh_state(
        &self,
        session_id: impl Into<String>,
        category: Option<QuizCategory>,
        user_data: UserData,
        now_ms: i64,
    ) -> FunnelState {
        let session_id = session_id.into();
        FunnelState {
            scarcity_seed: session_id.clone(),
            session_id,
            category,
            step: Step::FIRST,
            progress: 0.0,
            offer: OfferTierMachine::new(),
            user_choice: None,
            user_data,
            phase: Phase::Pending,
            restored: false,
            started_at: now_ms,
            step_entered_at: now_ms,
            exit_intent: ExitIntentLatch::default(),
            downsell_open: false,
        }
    }

    /// Rebuild a state from a saved snapshot. A snapshot that already ended
    /// is not resumable.
    pub fn restore_state(
        &self,
        snapshot: FunnelSnapshot,
        session_id: impl Into<String>,
        category: Option<QuizCategory>,
        now_ms: i64,
    ) -> Option<FunnelState> {
        let tier = snapshot.current_offer_tier.unwrap_or_default();
        if !tier.is_offer() {
            return None;
        }
        let step = snapshot.current_step;
        let progress = if snapshot.progress.is_finite() {
            snapshot.progress.clamp(
                self.rules.progress.start_for(step),
                self.rules.progress.target_for(step),
            )
        } else {
            self.rules.progress.start_for(step)
        };
        let user_choice = snapshot.user_choice.filter(|c| *c < CHOICE_COUNT);
        let mut state = self.fresh_state(session_id, category, snapshot.user_data, now_ms);
        if let Some(started_at) = snapshot.started_at {
            state.started_at = started_at.min(now_ms);
        }
        if let Some(seed) = snapshot.scarcity_seed.filter(|seed| !seed.is_empty()) {
            state.scarcity_seed = seed;
        }
        state.step = step;
        state.progress = progress;
        state.offer = OfferTierMachine::at(tier);
        state.user_choice = user_choice;
        state.restored = true;
        Some(state)
    }

    pub fn transition(&self, state: FunnelState, event: FunnelEvent, now_ms: i64) -> TransitionResult {
        if event == FunnelEvent::Mount {
            return self.mount(state, now_ms);
        }
        if !state.phase.is_live() {
            debug!(?event, phase = ?state.phase, "Funnel event ignored outside a live phase");
            return TransitionResult::unchanged(state);
        }

        let mut state = state;
        let mut effects = Vec::new();
        self.run_timers(&mut state, now_ms, &mut effects);

        match event {
            FunnelEvent::Mount | FunnelEvent::Tick => {}
            FunnelEvent::Proceed => self.on_proceed(&mut state, now_ms, &mut effects),
            FunnelEvent::Skip => self.on_skip(&mut state, now_ms, &mut effects),
            FunnelEvent::SelectChoice(choice) => self.on_choice(&mut state, choice, now_ms, &mut effects),
            FunnelEvent::Back => {
                if matches!(state.phase, Phase::Sequencing { .. }) && self.rules.policy.has_back(state.step) {
                    effects.push(Effect::Track(self.event(&state, EventType::BackClicked, now_ms)));
                }
            }
            FunnelEvent::Decline => self.on_decline(&mut state, now_ms, &mut effects),
            FunnelEvent::SkipToFree => self.on_skip_to_free(&mut state, now_ms, &mut effects),
            FunnelEvent::OfferClicked => self.on_offer_clicked(&mut state, now_ms, &mut effects),
            FunnelEvent::PointerLeave { client_y } => {
                self.on_pointer_leave(&mut state, client_y, now_ms, &mut effects)
            }
            FunnelEvent::DismissDownsell => state.downsell_open = false,
            FunnelEvent::PageHidden => {
                effects.push(Effect::Track(
                    self.event(&state, EventType::PageHidden, now_ms)
                        .with_metadata(serde_json::json!({ "progress": state.progress })),
                ));
                effects.push(Effect::Persist);
            }
            FunnelEvent::Unmount => self.on_unmount(&mut state, now_ms, &mut effects),
            FunnelEvent::DevRewind(to) => self.on_dev_rewind(&mut state, to, now_ms, &mut effects),
        }

        TransitionResult::new(state, effects)
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    fn mount(&self, mut state: FunnelState, now_ms: i64) -> TransitionResult {
        if state.phase != Phase::Pending {
            return TransitionResult::unchanged(state);
        }
        let mut effects = vec![Effect::Track(
            self.event(&state, EventType::SessionStarted, now_ms)
                .with_metadata(serde_json::json!({ "restored": state.restored })),
        )];
        if !state.restored {
            state.started_at = now_ms;
        }
        self.enter_step(&mut state, now_ms, &mut effects);
        effects.push(Effect::Persist);
        TransitionResult::new(state, effects)
    }

    fn on_unmount(&self, state: &mut FunnelState, now_ms: i64, effects: &mut Vec<Effect>) {
        effects.push(Effect::Track(
            self.event(state, EventType::StepExited, now_ms)
                .with_time_spent(seconds_between(state.step_entered_at, now_ms))
                .with_metadata(serde_json::json!({ "reason": "unmount" })),
        ));
        effects.push(Effect::Track(
            self.event(state, EventType::QuizAbandoned, now_ms)
                .with_metadata(serde_json::json!({ "progress": state.progress, "tier": state.tier() })),
        ));
        effects.push(Effect::Persist);
        state.phase = Phase::Unmounted;
        state.exit_intent.disarm();
        state.downsell_open = false;
    }

    fn on_dev_rewind(&self, state: &mut FunnelState, to: Step, now_ms: i64, effects: &mut Vec<Effect>) {
        if !self.rules.dev_mode || to >= state.step {
            debug!(from = %state.step, to = %to, "Rewind ignored");
            return;
        }
        effects.push(Effect::Track(
            self.event(state, EventType::StepExited, now_ms)
                .with_time_spent(seconds_between(state.step_entered_at, now_ms))
                .with_metadata(serde_json::json!({ "reason": "dev_rewind" })),
        ));
        state.step = to;
        state.progress = self.rules.progress.start_for(to);
        state.offer = OfferTierMachine::new();
        if to <= Step::CHOICE {
            state.user_choice = None;
        }
        state.exit_intent.disarm();
        state.downsell_open = false;
        self.enter_step(state, now_ms, effects);
        effects.push(Effect::Persist);
    }

    // ─── Timers ─────────────────────────────────────────────────────────────

    fn run_timers(&self, state: &mut FunnelState, now_ms: i64, effects: &mut Vec<Effect>) {
        loop {
            match state.phase.clone() {
                Phase::Sequencing { advance_at, next_ramp_at } => {
                    let next_ramp_at = self.apply_ramp(state, next_ramp_at, now_ms.min(advance_at));
                    if advance_at <= now_ms {
                        self.advance(state, advance_at, AdvanceReason::Timer, effects);
                        continue;
                    }
                    state.phase = Phase::Sequencing { advance_at, next_ramp_at };
                    break;
                }
                Phase::CatchingUp { next_tick_at } => {
                    let mut tick_at = next_tick_at;
                    let mut advanced = false;
                    while tick_at <= now_ms {
                        state.progress = self.rules.progress.catch_up_tick(state.progress, state.step);
                        if self.rules.progress.is_complete(state.progress, state.step) {
                            self.advance(state, tick_at, AdvanceReason::Skip, effects);
                            advanced = true;
                            break;
                        }
                        tick_at += self.rules.catch_up_tick_ms;
                    }
                    if advanced {
                        continue;
                    }
                    state.phase = Phase::CatchingUp { next_tick_at: tick_at };
                    break;
                }
                Phase::Offering { next_ramp_at } => {
                    let next_ramp_at = self.apply_ramp(state, next_ramp_at, now_ms);
                    state.phase = Phase::Offering { next_ramp_at };
                    break;
                }
                _ => break,
            }
        }
    }

    /// Apply every ramp tick scheduled at or before `horizon`; returns the
    /// next tick deadline.
    fn apply_ramp(&self, state: &mut FunnelState, next_ramp_at: i64, horizon: i64) -> i64 {
        if next_ramp_at > horizon {
            return next_ramp_at;
        }
        let tick = self.rules.ramp_tick_ms.max(1);
        let ticks = (horizon - next_ramp_at) / tick + 1;
        state.progress = self
            .rules
            .progress
            .ramp(state.progress, state.step, u64::try_from(ticks).unwrap_or(0));
        next_ramp_at + ticks * tick
    }

    // ─── Step sequencing ────────────────────────────────────────────────────

    fn enter_step(&self, state: &mut FunnelState, at: i64, effects: &mut Vec<Effect>) {
        state.step_entered_at = at;
        let next_ramp_at = at + self.rules.ramp_tick_ms;
        effects.push(Effect::Track(self.event(state, EventType::StepEntered, at)));

        if state.step.is_terminal() {
            state.phase = Phase::Offering { next_ramp_at };
            state.exit_intent.arm();
            state.downsell_open = false;
            if let Some(pixel) = self.view_content(state.tier()) {
                effects.push(Effect::Pixel(pixel));
            }
        } else {
            let timer = self.rules.policy.timer_ms(state.step).unwrap_or(0);
            state.phase = Phase::Sequencing {
                advance_at: at + i64::try_from(timer).unwrap_or(i64::MAX / 2),
                next_ramp_at,
            };
        }
    }

    /// Leave the current step at `at`: snap progress, emit the exit before
    /// the next entry, persist.
    fn advance(&self, state: &mut FunnelState, at: i64, reason: AdvanceReason, effects: &mut Vec<Effect>) {
        let leaving = state.step;
        let Some(next) = leaving.next() else {
            return;
        };

        if leaving == Step::CHOICE && state.user_choice.is_none() {
            state.user_choice = Some(0);
            effects.push(Effect::Track(
                self.event(state, EventType::ChoiceMade, at)
                    .with_metadata(serde_json::json!({ "choice": 0, "defaulted": true })),
            ));
        }

        state.progress = self.rules.progress.snap(state.progress, leaving);
        effects.push(Effect::Track(
            self.event(state, EventType::StepExited, at)
                .with_time_spent(seconds_between(state.step_entered_at, at))
                .with_metadata(serde_json::json!({
                    "reason": reason.as_str(),
                    "progress": state.progress,
                })),
        ));

        debug!(
            session_id = %state.session_id,
            from = %leaving,
            to = %next,
            reason = reason.as_str(),
            "Funnel step advanced"
        );
        state.step = next;
        self.enter_step(state, at, effects);
        effects.push(Effect::Persist);
    }

    fn on_proceed(&self, state: &mut FunnelState, now_ms: i64, effects: &mut Vec<Effect>) {
        if !matches!(state.phase, Phase::Sequencing { .. }) || !self.rules.policy.has_proceed(state.step) {
            return;
        }
        effects.push(Effect::Track(
            self.event(state, EventType::ButtonClick, now_ms)
                .with_metadata(serde_json::json!({ "button": "proceed" })),
        ));
        self.advance(state, now_ms, AdvanceReason::Proceed, effects);
    }

    fn on_skip(&self, state: &mut FunnelState, now_ms: i64, effects: &mut Vec<Effect>) {
        let visible_ms = now_ms - state.step_entered_at;
        if !matches!(state.phase, Phase::Sequencing { .. })
            || !self.rules.policy.skip_available(state.step, visible_ms)
        {
            debug!(step = %state.step, visible_ms, "Skip not available");
            return;
        }
        effects.push(Effect::Track(
            self.event(state, EventType::SkipUsed, now_ms)
                .with_metadata(serde_json::json!({ "progress": state.progress })),
        ));
        if self.rules.progress.is_complete(state.progress, state.step) {
            self.advance(state, now_ms, AdvanceReason::Skip, effects);
        } else {
            state.phase = Phase::CatchingUp {
                next_tick_at: now_ms + self.rules.catch_up_tick_ms,
            };
        }
    }

    fn on_choice(&self, state: &mut FunnelState, choice: u8, now_ms: i64, effects: &mut Vec<Effect>) {
        if !matches!(state.phase, Phase::Sequencing { .. }) || state.step != Step::CHOICE || choice >= CHOICE_COUNT {
            return;
        }
        state.user_choice = Some(choice);
        effects.push(Effect::Track(
            self.event(state, EventType::ChoiceMade, now_ms)
                .with_metadata(serde_json::json!({ "choice": choice, "defaulted": false })),
        ));
        self.advance(state, now_ms, AdvanceReason::Choice, effects);
    }

    // ─── Offer tiers ────────────────────────────────────────────────────────

    fn on_decline(&self, state: &mut FunnelState, now_ms: i64, effects: &mut Vec<Effect>) {
        if !matches!(state.phase, Phase::Offering { .. }) {
            return;
        }
        let from = state.tier();
        let Ok(to) = state.offer.decline() else {
            return;
        };
        effects.push(Effect::Track(self.tier_changed(state, from, to, "decline", now_ms)));
        state.downsell_open = false;

        if to.is_offer() {
            if let Some(pixel) = self.view_content(to) {
                effects.push(Effect::Pixel(pixel));
            }
            effects.push(Effect::ScrollToTop);
            effects.push(Effect::Persist);
        } else {
            self.finish_free(state, ExitReason::Declined, now_ms, effects);
        }
    }

    fn on_skip_to_free(&self, state: &mut FunnelState, now_ms: i64, effects: &mut Vec<Effect>) {
        if !matches!(state.phase, Phase::Offering { .. }) {
            return;
        }
        let from = state.tier();
        let Ok(to) = state.offer.skip_to_free() else {
            return;
        };
        effects.push(Effect::Track(self.tier_changed(state, from, to, "skip_to_free", now_ms)));
        self.finish_free(state, ExitReason::SkipToFree, now_ms, effects);
    }

    fn finish_free(&self, state: &mut FunnelState, reason: ExitReason, now_ms: i64, effects: &mut Vec<Effect>) {
        effects.push(Effect::Track(
            self.event(state, EventType::FunnelExit, now_ms)
                .with_metadata(serde_json::json!({ "reason": reason.as_str(), "lead": true })),
        ));
        effects.push(Effect::Pixel(PixelEvent::Lead {
            content_name: "free_plan".to_string(),
        }));
        effects.push(Effect::ClearPersisted);
        effects.push(Effect::ScrollToTop);
        state.phase = Phase::Finished(Outcome::FreePlan { reason });
        state.exit_intent.disarm();
        state.downsell_open = false;
    }

    fn on_offer_clicked(&self, state: &mut FunnelState, now_ms: i64, effects: &mut Vec<Effect>) {
        if !matches!(state.phase, Phase::Offering { .. }) {
            return;
        }
        let tier = state.tier();
        let Some(url) = self.rules.catalog.purchase_url(tier) else {
            return;
        };
        let price = self.rules.catalog.price(tier);
        effects.push(Effect::Track(
            self.event(state, EventType::OfferClicked, now_ms)
                .with_metadata(serde_json::json!({
                    "tier": tier,
                    "price": price,
                    "from_downsell": state.downsell_open,
                })),
        ));
        effects.push(Effect::Pixel(PixelEvent::AddToCart {
            content_name: tier.as_str().to_string(),
            value: price,
            currency: self.rules.catalog.currency().to_string(),
        }));
        effects.push(Effect::Track(
            self.event(state, EventType::FunnelExit, now_ms)
                .with_metadata(serde_json::json!({ "reason": "purchase", "tier": tier })),
        ));
        effects.push(Effect::ClearPersisted);
        effects.push(Effect::Redirect { url });
        state.phase = Phase::Finished(Outcome::Purchased { tier });
        state.exit_intent.disarm();
        state.downsell_open = false;
    }

    fn on_pointer_leave(&self, state: &mut FunnelState, client_y: f64, now_ms: i64, effects: &mut Vec<Effect>) {
        if !matches!(state.phase, Phase::Offering { .. }) {
            return;
        }
        if !state.exit_intent.on_pointer_leave(client_y, self.rules.exit_intent_top_px) {
            return;
        }
        let tier = state.tier();
        state.downsell_open = true;
        effects.push(Effect::OpenDownsell { tier });
        effects.push(Effect::Track(
            self.event(state, EventType::ExitIntent, now_ms)
                .with_metadata(serde_json::json!({ "tier": tier })),
        ));
        effects.push(Effect::Pixel(PixelEvent::Custom {
            name: "ExitIntent".to_string(),
            params: serde_json::json!({ "tier": tier }),
        }));
    }

    // ─── Event helpers ──────────────────────────────────────────────────────

    fn event(&self, state: &FunnelState, event_type: EventType, at: i64) -> AnalyticsEvent {
        make_event(event_type, state.session_id.clone(), u32::from(state.step.get()), from_ms(at))
            .with_category(state.category)
    }

    fn tier_changed(&self, state: &FunnelState, from: OfferTier, to: OfferTier, trigger: &str, at: i64) -> AnalyticsEvent {
        self.event(state, EventType::OfferTierChanged, at).with_metadata(serde_json::json!({
            "from": from,
            "to": to,
            "trigger": trigger,
        }))
    }

    fn view_content(&self, tier: OfferTier) -> Option<PixelEvent> {
        tier.is_offer().then(|| PixelEvent::ViewContent {
            content_name: tier.as_str().to_string(),
            value: self.rules.catalog.price(tier),
            currency: self.rules.catalog.currency().to_string(),
        })
    }
}

fn seconds_between(from_ms: i64, to_ms: i64) -> u64 {
    u64::try_from((to_ms - from_ms).max(0) + 500).unwrap_or(0) / 1_000
}
