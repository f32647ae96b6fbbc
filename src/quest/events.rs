//! Gameplay Event Types
//!
//! Fire-and-forget notifications from the combat, inventory, and
//! dialogue systems that can progress quest objectives.

use serde::{Deserialize, Serialize};

use crate::catalog::ObjectiveKind;

/// Events that can trigger quest progress
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameplayEvent {
    /// Player killed a monster
    MonsterKilled {
        monster_key: String,
        #[serde(default = "default_count")]
        count: i32,
    },

    /// Player obtained an item
    ItemObtained {
        item_key: String,
        #[serde(default = "default_count")]
        count: i32,
    },

    /// Player talked to an NPC
    NpcTalkedTo { npc_key: String },
}

fn default_count() -> i32 {
    1
}

impl GameplayEvent {
    /// Which objective kind this event can satisfy
    pub fn objective_kind(&self) -> ObjectiveKind {
        match self {
            GameplayEvent::MonsterKilled { .. } => ObjectiveKind::Kill,
            GameplayEvent::ItemObtained { .. } => ObjectiveKind::Object,
            GameplayEvent::NpcTalkedTo { .. } => ObjectiveKind::Talk,
        }
    }

    pub fn target_key(&self) -> &str {
        match self {
            GameplayEvent::MonsterKilled { monster_key, .. } => monster_key,
            GameplayEvent::ItemObtained { item_key, .. } => item_key,
            GameplayEvent::NpcTalkedTo { npc_key } => npc_key,
        }
    }

    pub fn count(&self) -> i32 {
        match self {
            GameplayEvent::MonsterKilled { count, .. } => *count,
            GameplayEvent::ItemObtained { count, .. } => *count,
            GameplayEvent::NpcTalkedTo { .. } => 1,
        }
    }

    /// Event type as string (for logging)
    pub fn event_type(&self) -> &'static str {
        match self {
            GameplayEvent::MonsterKilled { .. } => "monster_killed",
            GameplayEvent::ItemObtained { .. } => "item_obtained",
            GameplayEvent::NpcTalkedTo { .. } => "npc_talked_to",
        }
    }
}

/// Per-quest outcome of routing one gameplay event
#[derive(Debug, Clone, Serialize)]
pub struct QuestUpdate {
    pub quest_id: String,
    /// Whether any objective count changed
    pub changed: bool,
    /// Whether the completion transaction ran to success
    pub completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_mapping() {
        let event = GameplayEvent::MonsterKilled {
            monster_key: "wolf".to_string(),
            count: 2,
        };
        assert_eq!(event.objective_kind(), ObjectiveKind::Kill);
        assert_eq!(event.target_key(), "wolf");
        assert_eq!(event.count(), 2);
    }

    #[test]
    fn test_talk_events_count_once() {
        let event = GameplayEvent::NpcTalkedTo {
            npc_key: "innkeeper".to_string(),
        };
        assert_eq!(event.objective_kind(), ObjectiveKind::Talk);
        assert_eq!(event.count(), 1);
    }

    #[test]
    fn test_event_deserializes_with_default_count() {
        let event: GameplayEvent =
            serde_json::from_str(r#"{"type": "item_obtained", "item_key": "herb_01"}"#).unwrap();
        assert_eq!(event.target_key(), "herb_01");
        assert_eq!(event.count(), 1);
    }
}
