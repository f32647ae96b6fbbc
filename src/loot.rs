//! Quest Reward Generation
//!
//! Default `RewardSource` backed by the per-quest weighted loot table.
//! Each entry rolls independently against its percent weight, so a
//! table can mix guaranteed rewards (weight 100) with rare extras.

use rand::Rng;
use tracing::debug;

use crate::catalog::QuestDef;
use crate::ports::{ItemGrant, RewardSource};

pub struct WeightedLoot;

impl WeightedLoot {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WeightedLoot {
    fn default() -> Self {
        Self::new()
    }
}

impl RewardSource for WeightedLoot {
    fn reward_items(&self, owner: &str, quest: &QuestDef) -> Vec<ItemGrant> {
        let mut rng = rand::thread_rng();
        let mut grants = Vec::new();

        for entry in &quest.loot {
            if entry.weight >= 100 || rng.gen_range(0..100) < entry.weight {
                grants.push(ItemGrant {
                    item: entry.item.clone(),
                    count: entry.count,
                });
            }
        }

        debug!(
            "Rolled {} reward(s) from quest '{}' for {}",
            grants.len(),
            quest.id,
            owner
        );
        grants
    }
}
