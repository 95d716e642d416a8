use std::sync::Arc;

use testograph_core::config::AppConfig;
use testograph_core::event_bus::capture_sink;
use testograph_core::types::{EventType, QuizCategory};
use testograph_funnel::persistence::UserData;
use testograph_funnel::pixel::CapturePixelSink;
use testograph_funnel::{
    Clock, FunnelEvent, FunnelOrchestrator, FunnelStorage, ManualClock, MemoryStorage, OfferTier, Phase, Screen,
    Step,
};

const KEY: &str = "testograph_funnel_progress";

struct Harness {
    clock: Arc<ManualClock>,
    storage: Arc<MemoryStorage>,
    events: Arc<testograph_core::event_bus::CaptureSink>,
    pixels: Arc<CapturePixelSink>,
    funnel: FunnelOrchestrator,
}

fn harness_with(clock: Arc<ManualClock>, storage: Arc<MemoryStorage>) -> Harness {
    let events = capture_sink();
    let pixels = Arc::new(CapturePixelSink::new());
    let funnel = FunnelOrchestrator::new(&AppConfig::default(), storage.clone(), clock.clone())
        .unwrap()
        .with_event_sink(events.clone())
        .with_pixel_sink(pixels.clone());
    Harness {
        clock,
        storage,
        events,
        pixels,
        funnel,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(ManualClock::at_epoch()), Arc::new(MemoryStorage::new()))
}

impl Harness {
    fn advance(&mut self, ms: i64) {
        self.clock.advance_ms(ms);
        self.funnel.tick();
    }

    fn run_to_offers(&mut self) {
        while self.funnel.state().unwrap().step != Step::OFFER {
            self.advance(500);
        }
    }

    fn stored(&self) -> Option<serde_json::Value> {
        self.storage
            .get(KEY)
            .unwrap()
            .map(|raw| serde_json::from_str(&raw).unwrap())
    }
}

#[test]
fn test_full_run_to_purchase() {
    let mut h = harness();
    let data = UserData {
        first_name: Some("Petar".into()),
        age: Some(41),
        ..UserData::default()
    };
    h.funnel.mount(Some(data), Some(QuizCategory::Muscle));
    assert_eq!(h.events.types()[..2], [EventType::SessionStarted, EventType::StepEntered]);

    h.run_to_offers();
    assert_eq!(h.events.count_type(EventType::StepEntered), 8);
    assert_eq!(h.events.count_type(EventType::StepExited), 7);
    assert_eq!(h.stored().unwrap()["currentStep"], 8);
    assert_eq!(h.stored().unwrap()["userData"]["firstName"], "Petar");
    assert!(h.events.events().iter().all(|e| e.category == Some(QuizCategory::Muscle)));

    let view = h.funnel.view().unwrap();
    assert!(matches!(view.screen, Screen::Offer { .. }));
    assert!(view.scarcity.is_some());

    h.funnel.dispatch(FunnelEvent::OfferClicked);
    let redirect = h.funnel.last_redirect().unwrap();
    assert!(redirect.contains("tier=premium"));
    assert_eq!(h.pixels.names(), vec!["ViewContent", "AddToCart"]);
    assert!(h.stored().is_none());
    assert!(matches!(h.funnel.state().unwrap().phase, Phase::Finished(_)));
}

#[test]
fn test_decline_chain_ends_with_storage_cleared() {
    let mut h = harness();
    h.funnel.mount(None, None);
    h.run_to_offers();

    for expected in [OfferTier::Single, OfferTier::Digital] {
        h.clock.advance_ms(2_000);
        let state = h.funnel.dispatch(FunnelEvent::Decline).unwrap();
        assert_eq!(state.tier(), expected);
        assert_eq!(h.stored().unwrap()["currentOfferTier"], expected.as_str());
    }

    h.funnel.dispatch(FunnelEvent::Decline);
    assert_eq!(h.funnel.state().unwrap().tier(), OfferTier::Rejected);
    assert!(h.stored().is_none());
    assert_eq!(h.funnel.view().unwrap().screen, Screen::FreePlan);
    assert_eq!(h.pixels.names().last().map(String::as_str), Some("Lead"));
    assert_eq!(h.funnel.scroll_requests(), 3);
    assert_eq!(h.events.count_type(EventType::OfferTierChanged), 3);
    assert_eq!(h.events.count_type(EventType::FunnelExit), 1);
}

#[test]
fn test_reload_resumes_progress_with_new_session() {
    let clock = Arc::new(ManualClock::at_epoch());
    let storage = Arc::new(MemoryStorage::new());

    let mut first = harness_with(clock.clone(), storage.clone());
    first.funnel.mount(None, Some(QuizCategory::Energy));
    first.advance(16_000);
    first.advance(12_000);
    first.advance(3_000);
    let before = first.funnel.state().unwrap().clone();
    assert_eq!(before.step.get(), 3);
    first.funnel.dispatch(FunnelEvent::PageHidden);

    clock.advance_secs(3_600);
    let mut second = harness_with(clock.clone(), storage.clone());
    let resumed = second.funnel.mount(None, Some(QuizCategory::Energy)).clone();
    assert!(resumed.restored);
    assert_eq!(resumed.step.get(), 3);
    assert!(resumed.progress >= 25.0);
    assert_ne!(resumed.session_id, before.session_id);
    let started = &second.events.events()[0];
    assert_eq!(started.event_type, EventType::SessionStarted);
    assert_eq!(started.metadata["restored"], true);
}

#[test]
fn test_skip_to_free_clears_storage() {
    let mut h = harness();
    h.funnel.mount(None, None);
    h.run_to_offers();

    h.funnel.dispatch(FunnelEvent::Decline);
    assert_eq!(h.stored().unwrap()["currentOfferTier"], OfferTier::Single.as_str());

    h.funnel.dispatch(FunnelEvent::SkipToFree);
    assert!(h.stored().is_none());
    assert_eq!(h.funnel.view().unwrap().screen, Screen::FreePlan);
    assert_eq!(h.pixels.names().last().map(String::as_str), Some("Lead"));
}

#[test]
fn test_scarcity_survives_reload() {
    let clock = Arc::new(ManualClock::at_epoch());
    let storage = Arc::new(MemoryStorage::new());

    let mut first = harness_with(clock.clone(), storage.clone());
    first.funnel.mount(None, None);
    first.run_to_offers();
    first.advance(90_000);
    first.funnel.dispatch(FunnelEvent::PageHidden);
    let before = first.funnel.view().unwrap().scarcity.unwrap();

    clock.advance_secs(5);
    let mut second = harness_with(clock.clone(), storage);
    let resumed = second.funnel.mount(None, None).clone();
    assert!(resumed.restored);
    assert_eq!(resumed.step, Step::OFFER);
    let after = second.funnel.view().unwrap().scarcity.unwrap();

    assert_eq!(after.recent_buyers, before.recent_buyers);
    assert!(after.stock_left <= before.stock_left);
}

#[test]
fn test_expired_snapshot_starts_fresh() {
    let clock = Arc::new(ManualClock::at_epoch());
    let storage = Arc::new(MemoryStorage::new());

    let mut first = harness_with(clock.clone(), storage.clone());
    first.funnel.mount(None, None);
    for _ in 0..10 {
        first.advance(5_000);
    }
    assert!(first.funnel.state().unwrap().step.get() > 2);

    clock.advance_secs(24 * 3_600 + 1);
    let mut second = harness_with(clock.clone(), storage);
    let state = second.funnel.mount(None, None).clone();
    assert!(!state.restored);
    assert_eq!(state.step, Step::FIRST);
    assert_eq!(state.progress, 0.0);
}

#[test]
fn test_unmount_stops_the_funnel() {
    let mut h = harness();
    h.funnel.mount(None, None);
    h.advance(4_000);
    h.funnel.dispatch(FunnelEvent::Unmount);
    let count = h.events.count();
    h.advance(60_000);
    assert_eq!(h.events.count(), count);
    assert_eq!(h.funnel.state().unwrap().step, Step::FIRST);
    assert_eq!(h.events.count_type(EventType::QuizAbandoned), 1);
    assert!(h.clock.now_ms() > 0);
}
