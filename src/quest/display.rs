//! Progress Display Projection
//!
//! Formats an instance's objective state into human-readable progress
//! entries. Read-only over the instance; display names come from the
//! injected name registries. An objective with an authored description
//! shows that text and nothing else, so content can hide targets and
//! counts for narrative reasons.

use serde::Serialize;

use crate::catalog::ObjectiveKind;
use crate::ports::{NpcNames, RecordNames};

use super::instance::QuestInstance;

/// One line of a quest's progress listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProgressEntry {
    /// Authored text only; target and counts intentionally hidden
    Narrative { text: String },
    /// Generated from the objective definition and live counts
    Tracked {
        verb: &'static str,
        target_name: String,
        accomplished: i32,
        required: i32,
    },
}

/// Project an instance into ordered progress entries, catalog order.
pub fn describe(
    instance: &QuestInstance,
    npcs: &dyn NpcNames,
    records: &dyn RecordNames,
) -> Vec<ProgressEntry> {
    instance
        .objectives()
        .iter()
        .map(|def| {
            if let Some(text) = &def.description {
                return ProgressEntry::Narrative { text: text.clone() };
            }

            let target_name = match def.kind {
                ObjectiveKind::Talk => npcs.npc_name(&def.target_key),
                // Record catalogs first, then the NPC registry; a miss
                // degrades to an empty name rather than failing the listing.
                ObjectiveKind::Object | ObjectiveKind::Kill => records
                    .record_name(&def.target_key)
                    .unwrap_or_else(|| npcs.npc_name(&def.target_key)),
            };

            ProgressEntry::Tracked {
                verb: def.kind.verb(),
                target_name,
                accomplished: instance.progress(def.ordinal),
                required: def.required,
            }
        })
        .collect()
}
