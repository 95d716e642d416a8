//! Exit-intent latch for the offer step: fires once per visit when the
//! pointer leaves through the top edge of the viewport.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitIntentLatch {
    armed: bool,
    fired: bool,
}

impl ExitIntentLatch {
    /// Arm for a new visit to the offer step.
    pub fn arm(&mut self) {
        self.armed = true;
        self.fired = false;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Returns `true` exactly once per armed visit, for a leave at or above
    /// `top_edge_px`.
    pub fn on_pointer_leave(&mut self, client_y: f64, top_edge_px: f64) -> bool {
        if !self.armed || self.fired || client_y > top_edge_px {
            return false;
        }
        self.fired = true;
        true
    }
}
