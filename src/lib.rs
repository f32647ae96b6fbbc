//! Quest progress tracking and completion engine for a multiplayer
//! text-game server.

pub mod catalog;
pub mod db;
pub mod loot;
pub mod ports;
pub mod quest;
pub mod script;

pub use catalog::{NameDirectory, ObjectiveKind, QuestCatalog, QuestDef};
pub use db::ProgressStore;
pub use quest::{Collaborators, GameplayEvent, QuestEngine};
