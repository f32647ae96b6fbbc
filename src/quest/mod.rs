//! Quest Engine Module
//!
//! Per-player objective progress tracking and the one-time completion
//! transaction, driven by fire-and-forget gameplay events.

pub mod display;
pub mod engine;
pub mod events;
pub mod instance;

pub use display::{describe, ProgressEntry};
pub use engine::{Collaborators, CompleteError, EngineError, QuestEngine};
pub use events::{GameplayEvent, QuestUpdate};
pub use instance::QuestInstance;
