//! Quest Definition Structures
//!
//! These structures are deserialized from TOML quest files.

use serde::{Deserialize, Serialize};

/// A quest definition loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuestFile {
    pub quest: RawQuest,
}

/// Raw quest data as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuest {
    pub id: String,
    pub name: String,
    /// Optional Lua expression run when the quest completes
    #[serde(default)]
    pub action: Option<String>,
    /// Quest objectives
    #[serde(default)]
    pub objectives: Vec<RawObjective>,
    /// Weighted reward entries
    #[serde(default)]
    pub loot: Vec<RawLootEntry>,
}

/// Raw objective as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawObjective {
    pub ordinal: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub target: String,
    #[serde(default = "default_required")]
    pub required: i32,
    /// Pre-authored progress text; hides target and counts when set
    pub description: Option<String>,
}

fn default_required() -> i32 {
    1
}

/// Weighted loot entry as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawLootEntry {
    pub item: String,
    #[serde(default = "default_required")]
    pub count: i32,
    /// Drop chance in percent, 100 = guaranteed
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    100
}

// ============================================================================
// Resolved Quest Structures (after parsing)
// ============================================================================

/// Objective kinds supported by the quest engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectiveKind {
    /// Talk to a specific NPC
    Talk,
    /// Obtain X items of type Y
    Object,
    /// Kill X monsters of type Y
    Kill,
}

impl ObjectiveKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "talk_to" | "talk" => Some(ObjectiveKind::Talk),
            "get_object" | "object" | "get" => Some(ObjectiveKind::Object),
            "kill" => Some(ObjectiveKind::Kill),
            _ => None,
        }
    }

    /// Display verb used when an objective has no authored description
    pub fn verb(&self) -> &'static str {
        match self {
            ObjectiveKind::Talk => "Talk to",
            ObjectiveKind::Object => "Get",
            ObjectiveKind::Kill => "Kill",
        }
    }
}

/// A resolved quest objective
#[derive(Debug, Clone, Serialize)]
pub struct ObjectiveDef {
    /// Stable position of this objective within its quest
    pub ordinal: u32,
    pub kind: ObjectiveKind,
    /// Target NPC/item/monster key
    pub target_key: String,
    /// Count threshold, always positive
    pub required: i32,
    /// When set, overrides the generated progress text entirely
    pub description: Option<String>,
}

impl ObjectiveDef {
    pub fn from_raw(raw: &RawObjective) -> Result<Self, String> {
        let kind = ObjectiveKind::from_str(&raw.kind)
            .ok_or_else(|| format!("unknown objective type '{}'", raw.kind))?;
        if raw.required <= 0 {
            return Err(format!(
                "objective {} has non-positive required count {}",
                raw.ordinal, raw.required
            ));
        }
        Ok(Self {
            ordinal: raw.ordinal,
            kind,
            target_key: raw.target.clone(),
            required: raw.required,
            description: raw.description.clone(),
        })
    }
}

/// Weighted reward entry
#[derive(Debug, Clone, Serialize)]
pub struct LootEntry {
    pub item: String,
    pub count: i32,
    /// Drop chance in percent
    pub weight: u32,
}

impl LootEntry {
    pub fn from_raw(raw: &RawLootEntry) -> Self {
        Self {
            item: raw.item.clone(),
            count: raw.count,
            weight: raw.weight.min(100),
        }
    }
}

/// A fully resolved quest definition
#[derive(Debug, Clone)]
pub struct QuestDef {
    pub id: String,
    pub name: String,
    /// Optional Lua completion action
    pub action: Option<String>,
    /// Objectives in catalog order
    pub objectives: Vec<ObjectiveDef>,
    /// Weighted reward table
    pub loot: Vec<LootEntry>,
}

impl QuestDef {
    /// Create a QuestDef from raw TOML data
    pub fn from_raw(raw: &RawQuest) -> Result<Self, String> {
        let objectives: Vec<ObjectiveDef> = raw
            .objectives
            .iter()
            .map(|o| {
                ObjectiveDef::from_raw(o)
                    .map_err(|e| format!("quest '{}': {}", raw.id, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Duplicate ordinals are an upstream data-quality error; reject the
        // quest rather than letting one objective shadow another.
        let mut seen = std::collections::HashSet::new();
        for obj in &objectives {
            if !seen.insert(obj.ordinal) {
                return Err(format!(
                    "quest '{}' has duplicate objective ordinal {}",
                    raw.id, obj.ordinal
                ));
            }
        }

        Ok(Self {
            id: raw.id.clone(),
            name: raw.name.clone(),
            action: raw.action.clone(),
            objectives,
            loot: raw.loot.iter().map(LootEntry::from_raw).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objective_kind_parsing() {
        assert_eq!(ObjectiveKind::from_str("talk_to"), Some(ObjectiveKind::Talk));
        assert_eq!(ObjectiveKind::from_str("get_object"), Some(ObjectiveKind::Object));
        assert_eq!(ObjectiveKind::from_str("kill"), Some(ObjectiveKind::Kill));
        assert_eq!(ObjectiveKind::from_str("invalid"), None);
    }

    fn raw_objective(ordinal: u32, kind: &str) -> RawObjective {
        RawObjective {
            ordinal,
            kind: kind.to_string(),
            target: "rat".to_string(),
            required: 3,
            description: None,
        }
    }

    #[test]
    fn test_duplicate_ordinals_rejected() {
        let raw = RawQuest {
            id: "rat_cull".to_string(),
            name: "Rat Cull".to_string(),
            action: None,
            objectives: vec![raw_objective(0, "kill"), raw_objective(0, "kill")],
            loot: Vec::new(),
        };
        let err = QuestDef::from_raw(&raw).unwrap_err();
        assert!(err.contains("duplicate objective ordinal"));
    }

    #[test]
    fn test_non_positive_required_rejected() {
        let mut obj = raw_objective(0, "kill");
        obj.required = 0;
        let raw = RawQuest {
            id: "rat_cull".to_string(),
            name: "Rat Cull".to_string(),
            action: None,
            objectives: vec![obj],
            loot: Vec::new(),
        };
        assert!(QuestDef::from_raw(&raw).is_err());
    }
}
