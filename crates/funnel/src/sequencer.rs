//! Step sequencer rules: which micro-step comes next, when it auto-advances,
//! and which affordances (proceed, skip, back) each step offers.

use serde::{Deserialize, Serialize};
use std::fmt;
use testograph_core::config::FunnelConfig;

/// A micro-step number, always within `1..=8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Step(u8);

impl Step {
    pub const FIRST: Step = Step(1);
    pub const CHOICE: Step = Step(4);
    pub const OFFER: Step = Step(8);

    pub fn new(n: u8) -> Option<Step> {
        (1..=8).contains(&n).then_some(Step(n))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Index into per-step lookup tables.
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }

    pub fn next(self) -> Option<Step> {
        Step::new(self.0 + 1)
    }

    pub fn previous(self) -> Option<Step> {
        self.0.checked_sub(1).and_then(Step::new)
    }

    /// Step 8 hands control to the offer tiers.
    pub fn is_terminal(self) -> bool {
        self == Step::OFFER
    }
}

impl TryFrom<u8> for Step {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Step::new(value).ok_or_else(|| format!("step {value} outside 1..=8"))
    }
}

impl From<Step> for u8 {
    fn from(step: Step) -> u8 {
        step.0
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a step was left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceReason {
    Timer,
    Proceed,
    Choice,
    Skip,
}

impl AdvanceReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdvanceReason::Timer => "timer",
            AdvanceReason::Proceed => "proceed",
            AdvanceReason::Choice => "choice",
            AdvanceReason::Skip => "skip",
        }
    }
}

/// Number of answers offered on the "which problem hurts most" step.
pub const CHOICE_COUNT: u8 = 3;

/// Timer and affordance table for steps 1..=8.
#[derive(Debug, Clone)]
pub struct StepPolicy {
    timers_ms: Vec<u64>,
    skip_after_ms: u64,
    skip_max_step: u8,
}

impl StepPolicy {
    pub fn from_config(config: &FunnelConfig) -> Self {
        Self {
            timers_ms: config.step_timers_ms.clone(),
            skip_after_ms: config.skip_available_after_ms,
            skip_max_step: config.skip_max_step,
        }
    }

    /// Auto-advance delay for a step, `None` for the offer step.
    pub fn timer_ms(&self, step: Step) -> Option<u64> {
        if step.is_terminal() {
            return None;
        }
        self.timers_ms.get(step.index()).copied()
    }

    /// Proceed buttons exist on the content steps. Step 1 is the analysis
    /// screen and step 4 advances through its answer buttons.
    pub fn has_proceed(&self, step: Step) -> bool {
        !matches!(step.get(), 1 | 4 | 8)
    }

    pub fn has_back(&self, step: Step) -> bool {
        (2..=7).contains(&step.get())
    }

    pub fn is_skippable(&self, step: Step) -> bool {
        step.get() <= self.skip_max_step
    }

    /// Skip shows up once the step has been on screen long enough.
    pub fn skip_available(&self, step: Step, visible_ms: i64) -> bool {
        self.is_skippable(step) && visible_ms >= 0 && visible_ms as u64 >= self.skip_after_ms
    }

    pub fn skip_after_ms(&self) -> u64 {
        self.skip_after_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_bounds() {
        assert!(Step::new(0).is_none());
        assert!(Step::new(9).is_none());
        assert_eq!(Step::FIRST.next(), Step::new(2));
        assert_eq!(Step::OFFER.next(), None);
        assert_eq!(Step::FIRST.previous(), None);
        assert!(Step::OFFER.is_terminal());
        assert!(serde_json::from_str::<Step>("9").is_err());
        assert_eq!(serde_json::from_str::<Step>("4").unwrap(), Step::CHOICE);
    }

    #[test]
    fn test_policy_table() {
        let policy = StepPolicy::from_config(&FunnelConfig::default());
        assert_eq!(policy.timer_ms(Step::FIRST), Some(16_000));
        assert_eq!(policy.timer_ms(Step::CHOICE), Some(15_000));
        assert_eq!(policy.timer_ms(Step::OFFER), None);
        for n in 2..=7 {
            let ms = policy.timer_ms(Step::new(n).unwrap()).unwrap();
            assert!((10_000..=22_000).contains(&ms), "step {n} timer {ms}");
        }

        assert!(!policy.has_proceed(Step::FIRST));
        assert!(policy.has_proceed(Step::new(2).unwrap()));
        assert!(!policy.has_proceed(Step::CHOICE));
        assert!(!policy.has_back(Step::FIRST));
        assert!(policy.has_back(Step::new(7).unwrap()));
    }

    #[test]
    fn test_skip_window() {
        let policy = StepPolicy::from_config(&FunnelConfig::default());
        let two = Step::new(2).unwrap();
        assert!(!policy.skip_available(two, 5_999));
        assert!(policy.skip_available(two, 6_000));
        assert!(!policy.skip_available(Step::CHOICE, 60_000));
        assert!(!policy.skip_available(two, -1));
    }
}
