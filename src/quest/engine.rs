//! Quest Engine
//!
//! Owns the live quest instances and exposes the only two operations
//! the rest of the game calls: `on_gameplay_event` and
//! `check_and_complete`. Event application, the completion check, and
//! the completion transaction run as one critical section per instance;
//! different instances proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::catalog::QuestCatalog;
use crate::db::ProgressStore;
use crate::ports::{ActionRunner, Inventory, InventoryError, NpcNames, RecordNames, RewardSource};

use super::display::{describe, ProgressEntry};
use super::events::{GameplayEvent, QuestUpdate};
use super::instance::QuestInstance;

/// External systems the engine drives, constructor-injected
pub struct Collaborators {
    pub rewards: Arc<dyn RewardSource>,
    pub inventory: Arc<dyn Inventory>,
    pub actions: Arc<dyn ActionRunner>,
    pub npc_names: Arc<dyn NpcNames>,
    pub record_names: Arc<dyn RecordNames>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("progress store error: {0}")]
    Store(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum CompleteError {
    #[error("turn-in consumption failed: {0}")]
    TurnIn(#[from] InventoryError),
    #[error("progress store error: {0}")]
    Store(#[from] sqlx::Error),
}

type InstanceKey = (String, String);

pub struct QuestEngine {
    catalog: Arc<QuestCatalog>,
    store: Arc<ProgressStore>,
    collaborators: Collaborators,
    /// Live instances keyed by (owner, quest_id). The per-instance mutex
    /// serializes apply -> evaluate -> complete; completed instances are
    /// removed and never see another event.
    instances: DashMap<InstanceKey, Arc<Mutex<QuestInstance>>>,
}

impl QuestEngine {
    pub fn new(
        catalog: Arc<QuestCatalog>,
        store: Arc<ProgressStore>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            catalog,
            store,
            collaborators,
            instances: DashMap::new(),
        }
    }

    /// Assign a quest to a player, restoring any persisted progress.
    ///
    /// An unknown quest id is not an error: the instance simply has no
    /// objectives and is trivially accomplished.
    pub async fn assign(&self, owner: &str, quest_id: &str) -> Result<(), EngineError> {
        let key = (owner.to_string(), quest_id.to_string());
        if self.instances.contains_key(&key) {
            return Ok(());
        }

        let objectives = self.catalog.objectives(quest_id).await;

        let stored = self.store.load(owner, quest_id).await?;
        if let Some(row) = &stored {
            if row.status == "completed" {
                // Already archived; never resurrect a completed quest.
                warn!("Ignoring assignment of completed quest '{}' to {}", quest_id, owner);
                return Ok(());
            }
        }

        let (accomplished, rewards_granted, started_at) = match stored {
            Some(row) => (row.accomplished, row.rewards_granted, row.started_at),
            None => (HashMap::new(), false, Utc::now()),
        };

        let instance = QuestInstance::new(
            quest_id,
            owner,
            objectives,
            accomplished,
            rewards_granted,
            started_at,
        );

        self.store
            .upsert(
                owner,
                quest_id,
                instance.accomplished_counts(),
                instance.rewards_granted,
                instance.started_at,
            )
            .await?;

        // Two racing assignments both pass the contains_key fast path; the
        // loser's freshly built instance is discarded so a live instance
        // other tasks already hold is never replaced.
        match self.instances.entry(key) {
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                info!("Assigned quest '{}' to {}", quest_id, owner);
                slot.insert(Arc::new(Mutex::new(instance)));
            }
        }
        Ok(())
    }

    /// Route a gameplay event to the owner's live instances.
    ///
    /// For each instance the event changed, persists the new counts and,
    /// if the quest just became accomplished, runs the completion
    /// transaction under the same lock acquisition.
    pub async fn on_gameplay_event(
        &self,
        owner: &str,
        event: &GameplayEvent,
    ) -> Result<Vec<QuestUpdate>, EngineError> {
        // Snapshot the handles first; the instance locks are taken outside
        // the map iteration.
        let targets: Vec<(InstanceKey, Arc<Mutex<QuestInstance>>)> = self
            .instances
            .iter()
            .filter(|entry| entry.key().0 == owner)
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        debug!(
            "Routing {} event from {} to {} live quest(s)",
            event.event_type(),
            owner,
            targets.len()
        );

        let mut updates = Vec::new();

        for (key, handle) in targets {
            let mut instance = handle.lock().await;

            let changed = instance.apply(event.objective_kind(), event.target_key(), event.count());
            if !changed {
                continue;
            }

            self.store
                .upsert(
                    &instance.owner,
                    &instance.quest_id,
                    instance.accomplished_counts(),
                    instance.rewards_granted,
                    instance.started_at,
                )
                .await?;

            let mut completed = false;
            if instance.is_accomplished() {
                match self.run_completion(&mut instance).await {
                    Ok(()) => {
                        completed = true;
                        drop(instance);
                        self.instances.remove(&key);
                    }
                    Err(e) => {
                        // Instance stays accomplished-but-not-completed; a
                        // later check_and_complete retries safely.
                        error!(
                            "Completion of '{}' for {} aborted: {}",
                            key.1, key.0, e
                        );
                    }
                }
            }

            updates.push(QuestUpdate {
                quest_id: key.1.clone(),
                changed,
                completed,
            });
        }

        Ok(updates)
    }

    /// Complete the quest if it is fully accomplished.
    ///
    /// Returns `Ok(true)` when the completion transaction ran to success
    /// on this call; `Ok(false)` when there is nothing to do (not yet
    /// accomplished, or already retired).
    pub async fn check_and_complete(
        &self,
        owner: &str,
        quest_id: &str,
    ) -> Result<bool, CompleteError> {
        let key = (owner.to_string(), quest_id.to_string());
        let Some(handle) = self.instances.get(&key).map(|e| Arc::clone(e.value())) else {
            return Ok(false);
        };

        let mut instance = handle.lock().await;
        // A handle fetched before a concurrent completion retired the
        // instance still looks accomplished; completed_at is the
        // retirement marker that stops the transaction re-running.
        if instance.completed_at.is_some() || !instance.is_accomplished() {
            return Ok(false);
        }

        self.run_completion(&mut instance).await?;
        drop(instance);
        self.instances.remove(&key);
        Ok(true)
    }

    /// The one-time completion transaction:
    /// 1-2. roll rewards and deliver them (skipped entirely on retry once
    ///      the rewards-granted flag is persisted),
    /// 3.   run the quest's scripted action,
    /// 4.   consume turn-in objects in one batched removal,
    /// 5.   archive the row; the caller retires the live instance.
    async fn run_completion(&self, instance: &mut QuestInstance) -> Result<(), CompleteError> {
        let quest = self.catalog.get(&instance.quest_id).await;

        if !instance.rewards_granted {
            if let Some(quest) = &quest {
                let grants = self
                    .collaborators
                    .rewards
                    .reward_items(&instance.owner, quest);
                if !grants.is_empty() {
                    self.collaborators.inventory.add_items(&instance.owner, &grants);
                }
            }
            // Flag goes to disk before the remaining steps so a retry
            // after a step-4 failure cannot double-grant.
            instance.rewards_granted = true;
            self.store
                .mark_rewards_granted(&instance.owner, &instance.quest_id)
                .await?;
        }

        if let Some(action) = quest.as_ref().and_then(|q| q.action.as_deref()) {
            self.collaborators
                .actions
                .run(action, &instance.owner, None);
        }

        let turn_in = instance.turn_in_items();
        if !turn_in.is_empty() {
            if let Err(e) = self
                .collaborators
                .inventory
                .remove_items(&instance.owner, &turn_in)
            {
                error!(
                    "Turn-in consumption failed for quest '{}' of {}: {} (rewards are kept)",
                    instance.quest_id, instance.owner, e
                );
                return Err(e.into());
            }
        }

        // completed_at is the retirement marker late lock-holders check;
        // set it only once the row is archived, so a store failure here
        // leaves the instance retryable.
        let completed_at = Utc::now();
        self.store
            .mark_completed(&instance.owner, &instance.quest_id, completed_at)
            .await?;
        instance.completed_at = Some(completed_at);

        info!(
            "Quest '{}' completed by {}",
            instance.quest_id, instance.owner
        );
        Ok(())
    }

    /// Progress listing for one live instance, catalog order
    pub async fn describe(&self, owner: &str, quest_id: &str) -> Option<Vec<ProgressEntry>> {
        let key = (owner.to_string(), quest_id.to_string());
        let handle = self.instances.get(&key).map(|e| Arc::clone(e.value()))?;
        let instance = handle.lock().await;
        Some(describe(
            &instance,
            self.collaborators.npc_names.as_ref(),
            self.collaborators.record_names.as_ref(),
        ))
    }

    /// Quest ids of the owner's live instances
    pub fn active_quests(&self, owner: &str) -> Vec<String> {
        self.instances
            .iter()
            .filter(|entry| entry.key().0 == owner)
            .map(|entry| entry.key().1.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use tempfile::TempDir;

    use super::*;
    use crate::catalog::{LootEntry, ObjectiveDef, ObjectiveKind, QuestDef};
    use crate::loot::WeightedLoot;
    use crate::ports::ItemGrant;

    struct RecordingInventory {
        adds: StdMutex<Vec<(String, Vec<ItemGrant>)>>,
        removals: StdMutex<Vec<(String, Vec<(String, i32)>)>>,
        fail_removals: AtomicBool,
    }

    impl RecordingInventory {
        fn new() -> Self {
            Self {
                adds: StdMutex::new(Vec::new()),
                removals: StdMutex::new(Vec::new()),
                fail_removals: AtomicBool::new(false),
            }
        }
    }

    impl Inventory for RecordingInventory {
        fn add_items(&self, owner: &str, items: &[ItemGrant]) {
            self.adds
                .lock()
                .unwrap()
                .push((owner.to_string(), items.to_vec()));
        }

        fn remove_items(
            &self,
            owner: &str,
            items: &[(String, i32)],
        ) -> Result<(), InventoryError> {
            if self.fail_removals.load(Ordering::SeqCst) {
                return Err(InventoryError::Shortfall {
                    item: items[0].0.clone(),
                    need: items[0].1,
                    have: 0,
                });
            }
            self.removals
                .lock()
                .unwrap()
                .push((owner.to_string(), items.to_vec()));
            Ok(())
        }
    }

    struct CountingActions {
        runs: AtomicUsize,
    }

    impl ActionRunner for CountingActions {
        fn run(&self, _expr: &str, _owner: &str, _target: Option<&str>) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct NoNames;

    impl NpcNames for NoNames {
        fn npc_name(&self, _key: &str) -> String {
            String::new()
        }
    }

    impl RecordNames for NoNames {
        fn record_name(&self, _key: &str) -> Option<String> {
            None
        }
    }

    struct Harness {
        engine: QuestEngine,
        inventory: Arc<RecordingInventory>,
        actions: Arc<CountingActions>,
        _dir: TempDir,
    }

    async fn harness(quests: Vec<QuestDef>) -> Harness {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}/quests.db?mode=rwc", dir.path().display());
        let store = Arc::new(ProgressStore::new(&url).await.unwrap());

        let catalog = Arc::new(QuestCatalog::new(dir.path()));
        for quest in quests {
            catalog.insert(quest).await;
        }

        let inventory = Arc::new(RecordingInventory::new());
        let actions = Arc::new(CountingActions {
            runs: AtomicUsize::new(0),
        });

        let engine = QuestEngine::new(
            catalog,
            store,
            Collaborators {
                rewards: Arc::new(WeightedLoot::new()),
                inventory: Arc::clone(&inventory) as Arc<dyn Inventory>,
                actions: Arc::clone(&actions) as Arc<dyn ActionRunner>,
                npc_names: Arc::new(NoNames),
                record_names: Arc::new(NoNames),
            },
        );

        Harness {
            engine,
            inventory,
            actions,
            _dir: dir,
        }
    }

    fn kill_quest() -> QuestDef {
        QuestDef {
            id: "wolf_hunt".to_string(),
            name: "Wolf Hunt".to_string(),
            action: Some("actor_flag('wolves_culled')".to_string()),
            objectives: vec![ObjectiveDef {
                ordinal: 0,
                kind: ObjectiveKind::Kill,
                target_key: "wolf".to_string(),
                required: 3,
                description: None,
            }],
            loot: vec![LootEntry {
                item: "gold".to_string(),
                count: 10,
                weight: 100,
            }],
        }
    }

    fn gather_quest() -> QuestDef {
        QuestDef {
            id: "herb_run".to_string(),
            name: "Herb Run".to_string(),
            action: None,
            objectives: vec![ObjectiveDef {
                ordinal: 0,
                kind: ObjectiveKind::Object,
                target_key: "herb_01".to_string(),
                required: 2,
                description: None,
            }],
            loot: Vec::new(),
        }
    }

    fn kill_event(count: i32) -> GameplayEvent {
        GameplayEvent::MonsterKilled {
            monster_key: "wolf".to_string(),
            count,
        }
    }

    #[tokio::test]
    async fn test_end_to_end_kill_quest() {
        let h = harness(vec![kill_quest()]).await;
        h.engine.assign("alice", "wolf_hunt").await.unwrap();

        // First two kills: progress but no completion
        for _ in 0..2 {
            let updates = h.engine.on_gameplay_event("alice", &kill_event(1)).await.unwrap();
            assert_eq!(updates.len(), 1);
            assert!(updates[0].changed);
            assert!(!updates[0].completed);
        }

        // Third kill completes the quest inside the same call
        let updates = h.engine.on_gameplay_event("alice", &kill_event(1)).await.unwrap();
        assert!(updates[0].completed);

        // Reward delivered exactly once: 10 gold
        let adds = h.inventory.adds.lock().unwrap().clone();
        assert_eq!(adds.len(), 1);
        assert_eq!(
            adds[0].1,
            vec![ItemGrant {
                item: "gold".to_string(),
                count: 10
            }]
        );
        assert_eq!(h.actions.runs.load(Ordering::SeqCst), 1);

        // Retired: further events and completion calls are no-ops
        let updates = h.engine.on_gameplay_event("alice", &kill_event(1)).await.unwrap();
        assert!(updates.is_empty());
        assert!(!h.engine.check_and_complete("alice", "wolf_hunt").await.unwrap());
        assert_eq!(h.inventory.adds.lock().unwrap().len(), 1);
        assert_eq!(h.actions.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_check_and_complete_before_accomplishment_is_noop() {
        let h = harness(vec![kill_quest()]).await;
        h.engine.assign("alice", "wolf_hunt").await.unwrap();

        assert!(!h.engine.check_and_complete("alice", "wolf_hunt").await.unwrap());
        assert!(h.inventory.adds.lock().unwrap().is_empty());
        assert_eq!(h.actions.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_turn_in_consumption_is_one_batched_removal() {
        let h = harness(vec![gather_quest()]).await;
        h.engine.assign("alice", "herb_run").await.unwrap();

        let event = GameplayEvent::ItemObtained {
            item_key: "herb_01".to_string(),
            count: 2,
        };
        let updates = h.engine.on_gameplay_event("alice", &event).await.unwrap();
        assert!(updates[0].completed);

        let removals = h.inventory.removals.lock().unwrap().clone();
        assert_eq!(removals.len(), 1);
        assert_eq!(removals[0].1, vec![("herb_01".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_shortfall_aborts_then_retry_does_not_double_grant() {
        let h2 = harness(vec![QuestDef {
            id: "fetch".to_string(),
            name: "Fetch".to_string(),
            action: None,
            objectives: vec![ObjectiveDef {
                ordinal: 0,
                kind: ObjectiveKind::Object,
                target_key: "relic".to_string(),
                required: 1,
                description: None,
            }],
            loot: vec![LootEntry {
                item: "gold".to_string(),
                count: 5,
                weight: 100,
            }],
        }])
        .await;
        h2.inventory.fail_removals.store(true, Ordering::SeqCst);
        h2.engine.assign("alice", "fetch").await.unwrap();

        let event = GameplayEvent::ItemObtained {
            item_key: "relic".to_string(),
            count: 1,
        };
        // Event applies; completion aborts on the turn-in step
        let updates = h2.engine.on_gameplay_event("alice", &event).await.unwrap();
        assert!(updates[0].changed);
        assert!(!updates[0].completed);

        // Rewards were delivered in the failed attempt and are kept
        assert_eq!(h2.inventory.adds.lock().unwrap().len(), 1);

        // Inventory recovers; the retry completes without granting again
        h2.inventory.fail_removals.store(false, Ordering::SeqCst);
        assert!(h2.engine.check_and_complete("alice", "fetch").await.unwrap());
        assert_eq!(h2.inventory.adds.lock().unwrap().len(), 1);
        assert_eq!(h2.inventory.removals.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_handle_cannot_complete_twice() {
        let h = harness(vec![gather_quest()]).await;
        h.engine.assign("alice", "herb_run").await.unwrap();

        // A racer may clone the instance handle out of the map before the
        // winning completion retires it.
        let key = ("alice".to_string(), "herb_run".to_string());
        let stale = Arc::clone(h.engine.instances.get(&key).unwrap().value());

        let event = GameplayEvent::ItemObtained {
            item_key: "herb_01".to_string(),
            count: 2,
        };
        let updates = h.engine.on_gameplay_event("alice", &event).await.unwrap();
        assert!(updates[0].completed);

        // The late lock-holder sees a retired instance, not an
        // accomplished one, so the transaction does not re-run.
        h.engine.instances.insert(key, stale);
        assert!(!h.engine.check_and_complete("alice", "herb_run").await.unwrap());

        // Turn-in items were consumed exactly once
        assert_eq!(h.inventory.removals.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reassignment_never_replaces_the_live_instance() {
        let h = harness(vec![kill_quest()]).await;
        h.engine.assign("alice", "wolf_hunt").await.unwrap();

        // In-memory-only progress distinguishes the live instance from a
        // freshly restored replacement.
        let key = ("alice".to_string(), "wolf_hunt".to_string());
        {
            let handle = Arc::clone(h.engine.instances.get(&key).unwrap().value());
            let mut instance = handle.lock().await;
            instance.apply(ObjectiveKind::Kill, "wolf", 2);
        }

        h.engine.assign("alice", "wolf_hunt").await.unwrap();

        let handle = Arc::clone(h.engine.instances.get(&key).unwrap().value());
        assert_eq!(handle.lock().await.progress(0), 2);
    }

    #[tokio::test]
    async fn test_unknown_quest_is_trivially_accomplished() {
        let h = harness(Vec::new()).await;
        h.engine.assign("alice", "ghost_quest").await.unwrap();

        // No objectives, so the instance is already accomplished
        assert!(h.engine.check_and_complete("alice", "ghost_quest").await.unwrap());
        // No catalog entry means no rewards and no action
        assert!(h.inventory.adds.lock().unwrap().is_empty());
        assert_eq!(h.actions.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_progress_survives_reassignment() {
        let h = harness(vec![kill_quest()]).await;
        h.engine.assign("alice", "wolf_hunt").await.unwrap();
        h.engine.on_gameplay_event("alice", &kill_event(2)).await.unwrap();

        // Simulate a restart: drop the live instance, assign again
        h.engine.instances.clear();
        h.engine.assign("alice", "wolf_hunt").await.unwrap();

        // One more kill finishes the restored instance
        let updates = h.engine.on_gameplay_event("alice", &kill_event(1)).await.unwrap();
        assert!(updates[0].completed);
    }

    #[tokio::test]
    async fn test_events_only_touch_the_owner() {
        let h = harness(vec![kill_quest()]).await;
        h.engine.assign("alice", "wolf_hunt").await.unwrap();
        h.engine.assign("bob", "wolf_hunt").await.unwrap();

        h.engine.on_gameplay_event("alice", &kill_event(3)).await.unwrap();

        // Bob's instance is untouched and still live
        assert_eq!(h.engine.active_quests("bob"), vec!["wolf_hunt".to_string()]);
        assert!(h.engine.active_quests("alice").is_empty());
    }
}
