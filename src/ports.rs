//! Collaborator Contracts
//!
//! The quest engine drives external systems (loot generation, player
//! inventories, scripted effects, display-name registries) through
//! these traits. Implementations are constructor-injected; the engine
//! never reaches for a global handle.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::QuestDef;

/// An item to deliver to a player's inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemGrant {
    pub item: String,
    pub count: i32,
}

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("not enough '{item}': need {need}, have {have}")]
    Shortfall { item: String, need: i32, have: i32 },
}

/// Reward/loot generation. Side-effect-free until the returned grants
/// are delivered; may be randomized and may return nothing.
pub trait RewardSource: Send + Sync {
    fn reward_items(&self, owner: &str, quest: &QuestDef) -> Vec<ItemGrant>;
}

/// Player inventory operations
pub trait Inventory: Send + Sync {
    /// Unconditional delivery
    fn add_items(&self, owner: &str, items: &[ItemGrant]);

    /// Batched removal for quest turn-in. Fails with `Shortfall` if any
    /// entry cannot be satisfied in full.
    fn remove_items(&self, owner: &str, items: &[(String, i32)]) -> Result<(), InventoryError>;
}

/// Scripted completion effects. Fire-and-forget: implementations log
/// failures and never propagate them to the completion transaction.
pub trait ActionRunner: Send + Sync {
    fn run(&self, expr: &str, owner: &str, target: Option<&str>);
}

/// Dialogue NPC name registry
pub trait NpcNames: Send + Sync {
    /// Empty string if unknown
    fn npc_name(&self, key: &str) -> String;
}

/// Item/character record catalogs, consulted in a fixed priority order
pub trait RecordNames: Send + Sync {
    fn record_name(&self, key: &str) -> Option<String>;
}
