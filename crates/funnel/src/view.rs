//! Read-only projection of [`FunnelState`] for a renderer.

use serde::Serialize;

use crate::machine::{FunnelRules, FunnelState, Outcome, Phase};
use crate::offer::{OfferTier, OfferView};
use crate::scarcity::{ScarcitySimulator, ScarcityView};
use crate::sequencer::{Step, CHOICE_COUNT};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum Screen {
    /// Built, not yet mounted.
    Loading,
    /// Step 1: the "analysing your answers" screen.
    Analysis { first_name: Option<String> },
    /// Steps 2, 3 and 5..=7.
    Insight { step: Step },
    /// Step 4.
    ProblemChoice { options: u8, selected: Option<u8> },
    Offer { offer: OfferView },
    FreePlan,
    Redirecting { tier: OfferTier },
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewModel {
    pub session_id: String,
    pub step: Step,
    pub progress_percent: u8,
    pub screen: Screen,
    pub can_proceed: bool,
    pub can_skip: bool,
    /// Milliseconds until skip appears, when the step is skippable at all.
    pub skip_available_in_ms: Option<u64>,
    pub can_go_back: bool,
    pub catching_up: bool,
    /// The downsell modal opened by exit intent.
    pub downsell: Option<OfferView>,
    pub scarcity: Option<ScarcityView>,
}

pub fn render(state: &FunnelState, rules: &FunnelRules, scarcity: &ScarcitySimulator, now_ms: i64) -> ViewModel {
    let sequencing = matches!(state.phase, Phase::Sequencing { .. });
    let visible_ms = now_ms - state.step_entered_at;

    let screen = match &state.phase {
        Phase::Pending => Screen::Loading,
        Phase::Unmounted => Screen::Closed,
        Phase::Finished(Outcome::Purchased { tier }) => Screen::Redirecting { tier: *tier },
        Phase::Finished(Outcome::FreePlan { .. }) => Screen::FreePlan,
        Phase::Offering { .. } => match rules.catalog.view(state.tier()) {
            Some(offer) => Screen::Offer { offer },
            None => Screen::FreePlan,
        },
        Phase::Sequencing { .. } | Phase::CatchingUp { .. } => match state.step.get() {
            1 => Screen::Analysis {
                first_name: state.user_data.first_name.clone(),
            },
            4 => Screen::ProblemChoice {
                options: CHOICE_COUNT,
                selected: state.user_choice,
            },
            _ => Screen::Insight { step: state.step },
        },
    };

    let skip_available_in_ms = (sequencing && rules.policy.is_skippable(state.step)).then(|| {
        let after = i64::try_from(rules.policy.skip_after_ms()).unwrap_or(i64::MAX);
        u64::try_from((after - visible_ms).max(0)).unwrap_or(0)
    });

    let downsell = if state.downsell_open && matches!(state.phase, Phase::Offering { .. }) {
        rules.catalog.view(state.tier())
    } else {
        None
    };

    let scarcity = matches!(state.phase, Phase::Offering { .. }).then(|| {
        let elapsed_secs = u64::try_from((now_ms - state.started_at).max(0) / 1_000).unwrap_or(0);
        scarcity.view(&state.scarcity_seed, elapsed_secs)
    });

    ViewModel {
        session_id: state.session_id.clone(),
        step: state.step,
        progress_percent: state.progress.floor().clamp(0.0, 100.0) as u8,
        screen,
        can_proceed: sequencing && rules.policy.has_proceed(state.step),
        can_skip: sequencing && rules.policy.skip_available(state.step, visible_ms),
        skip_available_in_ms,
        can_go_back: sequencing && rules.policy.has_back(state.step),
        catching_up: matches!(state.phase, Phase::CatchingUp { .. }),
        downsell,
        scarcity,
    }
}
