//! Quest Instance State
//!
//! Per-player runtime record of progress toward one assigned quest:
//! accumulated counts per objective plus a maintained index of
//! not-yet-satisfied objectives grouped by kind, so incoming events
//! match in O(objectives of that kind) instead of O(all objectives).
//!
//! The two containers are kept in lockstep behind `apply`; nothing else
//! mutates them. Invariant: an ordinal appears in the bucket for its
//! kind iff its accumulated count is below the objective's threshold.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::catalog::{ObjectiveDef, ObjectiveKind};

/// Runtime progress for one assigned quest
#[derive(Debug, Clone)]
pub struct QuestInstance {
    pub quest_id: String,
    /// Owning player key; lookup reference only
    pub owner: String,
    /// Objective definitions snapshotted from the catalog, in catalog order
    objectives: Vec<ObjectiveDef>,
    /// ordinal -> accumulated count; absent entries are zero.
    /// Counts never decrease; overshoot past the threshold is preserved.
    accomplished: HashMap<u32, i32>,
    /// kind -> ordinals still below threshold, in catalog order
    not_accomplished: HashMap<ObjectiveKind, Vec<u32>>,
    /// Set once completion steps 1-2 (reward grant) have succeeded, so a
    /// retried completion never double-grants
    pub rewards_granted: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QuestInstance {
    /// Build an instance from catalog definitions and previously persisted
    /// counts (empty map for a fresh assignment).
    pub fn new(
        quest_id: &str,
        owner: &str,
        objectives: Vec<ObjectiveDef>,
        accomplished: HashMap<u32, i32>,
        rewards_granted: bool,
        started_at: DateTime<Utc>,
    ) -> Self {
        let mut instance = Self {
            quest_id: quest_id.to_string(),
            owner: owner.to_string(),
            objectives,
            accomplished,
            not_accomplished: HashMap::new(),
            rewards_granted,
            started_at,
            completed_at: None,
        };
        instance.rebuild_index();
        instance
    }

    /// Derive the pending-objective index from scratch. Load-time only;
    /// `apply` maintains it incrementally afterwards.
    fn rebuild_index(&mut self) {
        self.not_accomplished.clear();
        for def in &self.objectives {
            let count = self.accomplished.get(&def.ordinal).copied().unwrap_or(0);
            if count < def.required {
                self.not_accomplished
                    .entry(def.kind)
                    .or_default()
                    .push(def.ordinal);
            }
        }
    }

    /// Apply a gameplay event to this instance.
    ///
    /// Every pending objective of the event's kind whose target matches
    /// gains `count`; ordinals that reach their threshold leave the
    /// index, and an emptied bucket is dropped entirely. Returns whether
    /// any count changed, so callers can skip the completion check on
    /// irrelevant events.
    pub fn apply(&mut self, kind: ObjectiveKind, target_key: &str, count: i32) -> bool {
        // Counts only move forward; a zero or negative delta is malformed
        // input, not progress.
        if count <= 0 {
            return false;
        }
        // Most events are irrelevant to most quests; no bucket, no work.
        let Some(bucket) = self.not_accomplished.remove(&kind) else {
            return false;
        };

        let mut changed = false;
        // Partition into a fresh pending list instead of deleting mid-scan;
        // in-place removal during a forward scan skips neighbours.
        let mut still_pending = Vec::with_capacity(bucket.len());

        for ordinal in bucket {
            let Some(def) = self.objectives.iter().find(|d| d.ordinal == ordinal) else {
                continue;
            };

            if def.target_key != target_key {
                still_pending.push(ordinal);
                continue;
            }

            let total = self.accomplished.entry(ordinal).or_insert(0);
            *total += count;
            changed = true;

            if *total < def.required {
                still_pending.push(ordinal);
            }
        }

        if !still_pending.is_empty() {
            self.not_accomplished.insert(kind, still_pending);
        }

        changed
    }

    /// Whether every objective has reached its threshold. O(1): the
    /// maintained index empties exactly when the quest is accomplished.
    pub fn is_accomplished(&self) -> bool {
        self.not_accomplished.is_empty()
    }

    /// Accumulated count for an objective (zero if untouched)
    pub fn progress(&self, ordinal: u32) -> i32 {
        self.accomplished.get(&ordinal).copied().unwrap_or(0)
    }

    /// Objective definitions in catalog order
    pub fn objectives(&self) -> &[ObjectiveDef] {
        &self.objectives
    }

    /// Persisted representation of the progress counts
    pub fn accomplished_counts(&self) -> &HashMap<u32, i32> {
        &self.accomplished
    }

    /// Turn-in consumption list: one `(target_key, required)` entry per
    /// Object-kind objective, for a single batched inventory removal.
    pub fn turn_in_items(&self) -> Vec<(String, i32)> {
        self.objectives
            .iter()
            .filter(|d| d.kind == ObjectiveKind::Object)
            .map(|d| (d.target_key.clone(), d.required))
            .collect()
    }

    /// Whether an ordinal is still in the pending index (tests and
    /// consistency checks)
    pub fn is_pending(&self, ordinal: u32) -> bool {
        self.not_accomplished
            .values()
            .any(|bucket| bucket.contains(&ordinal))
    }

    /// Full re-derivation of the index invariant. Never on the event
    /// path; used by tests after every mutation.
    #[cfg(test)]
    fn assert_index_consistent(&self) {
        for def in &self.objectives {
            let count = self.progress(def.ordinal);
            let pending = self
                .not_accomplished
                .get(&def.kind)
                .map_or(false, |b| b.contains(&def.ordinal));
            assert_eq!(
                pending,
                count < def.required,
                "index out of sync for ordinal {}: count {} / required {}",
                def.ordinal,
                count,
                def.required
            );
        }
        for bucket in self.not_accomplished.values() {
            assert!(!bucket.is_empty(), "empty bucket left in index");
        }
    }
}
