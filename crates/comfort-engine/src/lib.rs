//! Comfort automation engine
//!
//! Resolves fan and light actions from sensor readings through two rule
//! sets (fixed rules and learned user preferences), applies user action
//! batches immediately or on a schedule, and keeps everything persisted
//! through the comfort core store.

pub mod describe;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod learner;
pub mod model;
pub mod poller;
pub mod presets;
pub mod scheduler;
pub mod settings;

pub use engine::{BatchReport, ComfortEngine, EngineEvent, FireOutcome, IntentOutcome};
pub use error::EngineError;
pub use model::*;
pub use settings::EngineSettings;
