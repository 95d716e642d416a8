//! Simulated analysis progress bar.
//!
//! Progress ramps slowly towards the current step's target minus a buffer,
//! snaps to the exact target when the step advances, and runs a fast
//! catch-up when the visitor skips. It never moves backwards.

use testograph_core::config::FunnelConfig;

use crate::sequencer::Step;

#[derive(Debug, Clone)]
pub struct ProgressSimulator {
    targets: Vec<f64>,
    ramp_increment: f64,
    ramp_buffer: f64,
    catch_up_increment: f64,
}

impl ProgressSimulator {
    pub fn from_config(config: &FunnelConfig) -> Self {
        Self {
            targets: config.progress_targets.clone(),
            ramp_increment: config.ramp_increment,
            ramp_buffer: config.ramp_buffer,
            catch_up_increment: config.catch_up_increment,
        }
    }

    /// Value reached when `step` is left.
    pub fn target_for(&self, step: Step) -> f64 {
        self.targets.get(step.index()).copied().unwrap_or(100.0)
    }

    /// Value the bar starts from on `step`.
    pub fn start_for(&self, step: Step) -> f64 {
        step.previous().map_or(0.0, |prev| self.target_for(prev))
    }

    /// Highest value the idle ramp may reach on `step`.
    pub fn ceiling_for(&self, step: Step) -> f64 {
        (self.target_for(step) - self.ramp_buffer).max(self.start_for(step))
    }

    /// Apply `ticks` idle-ramp ticks at once. Linear and capped, so this is
    /// identical to applying them one by one.
    pub fn ramp(&self, progress: f64, step: Step, ticks: u64) -> f64 {
        let ceiling = self.ceiling_for(step);
        if progress >= ceiling {
            return progress;
        }
        (progress + self.ramp_increment * ticks as f64).min(ceiling)
    }

    /// One catch-up tick after a skip; lands exactly on the target.
    pub fn catch_up_tick(&self, progress: f64, step: Step) -> f64 {
        let target = self.target_for(step);
        if progress >= target {
            return progress;
        }
        (progress + self.catch_up_increment).min(target)
    }

    pub fn is_complete(&self, progress: f64, step: Step) -> bool {
        progress >= self.target_for(step)
    }

    /// Progress at the moment `step` is left.
    pub fn snap(&self, progress: f64, step: Step) -> f64 {
        self.target_for(step).max(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim() -> ProgressSimulator {
        ProgressSimulator::from_config(&FunnelConfig::default())
    }

    #[test]
    fn test_targets_table() {
        let sim = sim();
        assert_eq!(sim.target_for(Step::new(2).unwrap()), 25.0);
        assert_eq!(sim.target_for(Step::new(3).unwrap()), 37.0);
        assert_eq!(sim.target_for(Step::OFFER), 98.0);
        assert_eq!(sim.start_for(Step::FIRST), 0.0);
        assert_eq!(sim.start_for(Step::new(3).unwrap()), 25.0);
    }

    #[test]
    fn test_ramp_stops_below_target() {
        let sim = sim();
        let step = Step::new(3).unwrap();
        let mut progress = sim.start_for(step);
        let mut last = progress;
        for _ in 0..1_000 {
            progress = sim.ramp(progress, step, 1);
            assert!(progress >= last);
            last = progress;
        }
        assert_eq!(progress, 34.0);
        assert!(progress < sim.target_for(step));
    }

    #[test]
    fn test_bulk_ramp_matches_single_ticks() {
        let sim = sim();
        let step = Step::new(2).unwrap();
        let mut one_by_one = 12.0;
        for _ in 0..7 {
            one_by_one = sim.ramp(one_by_one, step, 1);
        }
        assert_eq!(sim.ramp(12.0, step, 7), one_by_one);
    }

    #[test]
    fn test_catch_up_lands_on_target() {
        let sim = sim();
        let step = Step::new(2).unwrap();
        let mut progress = 10.0;
        let mut seen = Vec::new();
        while !sim.is_complete(progress, step) {
            progress = sim.catch_up_tick(progress, step);
            seen.push(progress);
        }
        assert_eq!(progress, 25.0);
        assert_eq!(seen.first(), Some(&12.5));
        assert!(seen.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_snap_never_lowers() {
        let sim = sim();
        assert_eq!(sim.snap(20.0, Step::new(2).unwrap()), 25.0);
        assert_eq!(sim.snap(30.0, Step::new(2).unwrap()), 30.0);
    }
}
