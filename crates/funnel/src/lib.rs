//! Result-funnel progression engine: drives a visitor through the eight
//! micro-steps that follow the quiz, simulates the analysis progress bar,
//! and walks the offer tiers as the visitor declines.
//!
//! The engine is headless: [`machine::FunnelMachine`] is a pure transition
//! function over [`machine::FunnelState`], time arrives through the
//! [`clock::Clock`] port, and side effects come back as data that
//! [`orchestrator::FunnelOrchestrator`] executes against the storage,
//! tracking and pixel ports.

pub mod clock;
pub mod exit_intent;
pub mod machine;
pub mod offer;
pub mod orchestrator;
pub mod persistence;
pub mod pixel;
pub mod progress;
pub mod scarcity;
pub mod sequencer;
pub mod view;

pub use clock::{Clock, ManualClock, SystemClock};
pub use machine::{Effect, FunnelEvent, FunnelMachine, FunnelState, Phase};
pub use offer::{OfferCatalog, OfferTier, OfferTierMachine};
pub use orchestrator::FunnelOrchestrator;
pub use persistence::{FileStorage, FunnelSnapshot, FunnelStorage, MemoryStorage, PersistenceAdapter};
pub use pixel::{PixelEvent, PixelSink};
pub use sequencer::Step;
pub use view::{render, Screen, ViewModel};
