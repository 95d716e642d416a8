//! Runs the funnel machine against real ports: feeds it clock time, executes
//! the effects it returns, and keeps the current state.

use std::sync::Arc;

use testograph_core::config::AppConfig;
use testograph_core::event_bus::{noop_sink, EventSink};
use testograph_core::types::QuizCategory;
use testograph_core::TestographResult;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::machine::{Effect, FunnelEvent, FunnelMachine, FunnelState};
use crate::persistence::{FunnelStorage, PersistenceAdapter, UserData};
use crate::pixel::{noop_pixel, PixelSink};
use crate::scarcity::ScarcitySimulator;
use crate::view::{render, ViewModel};

pub struct FunnelOrchestrator {
    machine: FunnelMachine,
    state: Option<FunnelState>,
    persistence: PersistenceAdapter,
    events: Arc<dyn EventSink>,
    pixel: Arc<dyn PixelSink>,
    clock: Arc<dyn Clock>,
    scarcity: ScarcitySimulator,
    scroll_requests: u32,
    last_redirect: Option<String>,
}

impl FunnelOrchestrator {
    pub fn new(config: &AppConfig, storage: Arc<dyn FunnelStorage>, clock: Arc<dyn Clock>) -> TestographResult<Self> {
        let machine = FunnelMachine::from_config(config)?;
        Ok(Self {
            machine,
            state: None,
            persistence: PersistenceAdapter::new(
                storage,
                config.funnel.storage_key.clone(),
                config.funnel.session_ttl_hours,
            ),
            events: noop_sink(),
            pixel: noop_pixel(),
            clock,
            scarcity: ScarcitySimulator::new(config.scarcity.clone()),
            scroll_requests: 0,
            last_redirect: None,
        })
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn with_pixel_sink(mut self, sink: Arc<dyn PixelSink>) -> Self {
        self.pixel = sink;
        self
    }

    pub fn machine(&self) -> &FunnelMachine {
        &self.machine
    }

    /// Start a visit. A resumable snapshot younger than the TTL is picked up;
    /// otherwise the visitor starts at step 1 with `user_data` from the quiz.
    /// Either way the visit gets a fresh session id; a resumed visit keeps its
    /// scarcity seed and start time.
    pub fn mount(&mut self, user_data: Option<UserData>, category: Option<QuizCategory>) -> &FunnelState {
        let now = self.clock.now_ms();
        let session_id = Uuid::new_v4().to_string();
        let restored = self
            .persistence
            .load(now)
            .and_then(|snapshot| self.machine.restore_state(snapshot, session_id.clone(), category, now));

        let state = match restored {
            Some(state) => {
                info!(session_id = %state.session_id, step = %state.step, progress = state.progress, "Funnel resumed from snapshot");
                state
            }
            None => {
                info!(session_id = %session_id, "Funnel started");
                self.machine
                    .fresh_state(session_id, category, user_data.unwrap_or_default(), now)
            }
        };
        self.last_redirect = None;
        let state = self.apply(state, FunnelEvent::Mount);
        self.state.insert(state)
    }

    /// Feed one event through the machine at the current clock time and run
    /// the resulting effects. Before `mount` this does nothing.
    pub fn dispatch(&mut self, event: FunnelEvent) -> Option<&FunnelState> {
        let state = self.state.take()?;
        let state = self.apply(state, event);
        Some(self.state.insert(state))
    }

    /// Replay timers that fell due since the last call.
    pub fn tick(&mut self) -> Option<&FunnelState> {
        self.dispatch(FunnelEvent::Tick)
    }

    fn apply(&mut self, state: FunnelState, event: FunnelEvent) -> FunnelState {
        let now = self.clock.now_ms();
        let result = self.machine.transition(state, event, now);
        for effect in &result.effects {
            self.execute(effect, &result.state, now);
        }
        result.state
    }

    pub fn state(&self) -> Option<&FunnelState> {
        self.state.as_ref()
    }

    pub fn view(&self) -> Option<ViewModel> {
        let state = self.state.as_ref()?;
        Some(render(state, self.machine.rules(), &self.scarcity, self.clock.now_ms()))
    }

    /// Storefront URL the visitor was sent to, once they clicked an offer.
    pub fn last_redirect(&self) -> Option<&str> {
        self.last_redirect.as_deref()
    }

    pub fn scroll_requests(&self) -> u32 {
        self.scroll_requests
    }

    fn execute(&mut self, effect: &Effect, state: &FunnelState, now: i64) {
        metrics::counter!("funnel.effects", "kind" => effect.kind()).increment(1);
        match effect {
            Effect::Track(event) => self.events.emit(event.clone()),
            Effect::Pixel(event) => self.pixel.track(event.clone()),
            Effect::Persist => self.persistence.save(&state.snapshot(now)),
            Effect::ClearPersisted => self.persistence.clear(),
            Effect::ScrollToTop => {
                self.scroll_requests += 1;
                debug!(session_id = %state.session_id, "Scroll to top");
            }
            Effect::OpenDownsell { tier } => {
                debug!(session_id = %state.session_id, tier = %tier, "Exit intent downsell opened");
            }
            Effect::Redirect { url } => {
                info!(session_id = %state.session_id, url = %url, "Redirecting to storefront");
                self.last_redirect = Some(url.clone());
            }
        }
    }
}
