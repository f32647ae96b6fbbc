//! Objective Catalog
//!
//! Read-only quest and objective definitions plus the display-name
//! registries, all loaded from TOML data files.

pub mod definition;
pub mod names;
pub mod registry;

pub use definition::{LootEntry, ObjectiveDef, ObjectiveKind, QuestDef};
pub use names::{NameDirectory, DEFAULT_RECORD_CATALOGS};
pub use registry::{HotReloadEvent, QuestCatalog};
