//! Objective Catalog
//!
//! Loads, caches, and manages quest definitions from TOML files.
//! Supports hot-reloading during development.
//!
//! Unknown quest ids are not an error at lookup time: callers get an
//! empty objective list and the corresponding instance is trivially
//! accomplished.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::definition::{ObjectiveDef, QuestDef, RawQuestFile};

/// Registry for all quest definitions
pub struct QuestCatalog {
    /// Loaded quest definitions
    quests: RwLock<HashMap<String, Arc<QuestDef>>>,
    /// Base directory for quest data
    data_dir: PathBuf,
}

impl QuestCatalog {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            quests: RwLock::new(HashMap::new()),
            data_dir: data_dir.join("quests"),
        }
    }

    /// Load all quest definitions from the data directory
    pub async fn load_all(&self) -> Result<(), String> {
        info!("Loading quests from {:?}", self.data_dir);

        if !self.data_dir.exists() {
            warn!("Quest directory does not exist: {:?}", self.data_dir);
            return Ok(());
        }

        let mut paths = Vec::new();
        self.collect_quest_files(&self.data_dir, &mut paths)?;

        let mut count = 0;
        for path in paths {
            if let Err(e) = self.load_quest_file(&path).await {
                warn!("Failed to load quest {:?}: {}", path, e);
            } else {
                count += 1;
            }
        }

        info!("Loaded {} quest definitions", count);
        Ok(())
    }

    /// Recursively collect quest TOML file paths
    fn collect_quest_files(&self, dir: &Path, paths: &mut Vec<PathBuf>) -> Result<(), String> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| format!("Failed to read directory {:?}: {}", dir, e))?;

        for entry in entries {
            let entry = entry.map_err(|e| format!("Failed to read entry: {}", e))?;
            let path = entry.path();

            if path.is_dir() {
                self.collect_quest_files(&path, paths)?;
            } else if path.extension().map_or(false, |ext| ext == "toml") {
                paths.push(path);
            }
        }

        Ok(())
    }

    /// Load a single quest file
    async fn load_quest_file(&self, path: &Path) -> Result<(), String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;

        let raw: RawQuestFile = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;

        let quest = QuestDef::from_raw(&raw.quest)?;
        info!("Loaded quest: {} ({})", quest.name, quest.id);

        self.insert(quest).await;
        Ok(())
    }

    /// Insert a quest definition directly (loader and tests)
    pub async fn insert(&self, quest: QuestDef) {
        let mut quests = self.quests.write().await;
        quests.insert(quest.id.clone(), Arc::new(quest));
    }

    /// Get a quest by ID
    pub async fn get(&self, quest_id: &str) -> Option<Arc<QuestDef>> {
        let quests = self.quests.read().await;
        quests.get(quest_id).cloned()
    }

    /// Ordered objective definitions for a quest; empty for unknown ids
    pub async fn objectives(&self, quest_id: &str) -> Vec<ObjectiveDef> {
        match self.get(quest_id).await {
            Some(quest) => quest.objectives.clone(),
            None => Vec::new(),
        }
    }

    /// Get count of loaded quests
    pub async fn count(&self) -> usize {
        self.quests.read().await.len()
    }

    /// Start file watcher for hot-reload
    /// Returns a channel receiver that signals when reloads occur
    pub fn start_file_watcher(
        self: &Arc<Self>,
    ) -> Result<tokio::sync::mpsc::Receiver<HotReloadEvent>, String> {
        use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
        use std::time::Duration;

        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let catalog = Arc::clone(self);
        let data_dir = self.data_dir.clone();
        let rt = tokio::runtime::Handle::current();

        std::thread::spawn(move || {
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();

            let mut watcher = match RecommendedWatcher::new(
                move |res: Result<notify::Event, notify::Error>| {
                    if let Ok(event) = res {
                        let _ = notify_tx.send(event);
                    }
                },
                Config::default().with_poll_interval(Duration::from_secs(1)),
            ) {
                Ok(w) => w,
                Err(e) => {
                    error!("Failed to create file watcher: {}", e);
                    return;
                }
            };

            if data_dir.exists() {
                if let Err(e) = watcher.watch(&data_dir, RecursiveMode::Recursive) {
                    error!("Failed to watch quest directory: {}", e);
                }
            }

            info!("Quest hot-reload watcher started for {:?}", data_dir);

            loop {
                match notify_rx.recv() {
                    Ok(event) => {
                        use notify::EventKind;
                        match event.kind {
                            EventKind::Modify(_) | EventKind::Create(_) => {
                                for path in &event.paths {
                                    let extension = path
                                        .extension()
                                        .and_then(|e| e.to_str())
                                        .unwrap_or("");

                                    if extension == "toml" {
                                        info!("Detected change in {:?}, triggering reload", path);

                                        let cat = Arc::clone(&catalog);
                                        let tx = tx.clone();
                                        let path_clone = path.clone();

                                        rt.spawn(async move {
                                            if let Err(e) = cat.load_all().await {
                                                error!("Hot-reload failed: {}", e);
                                                let _ = tx.send(HotReloadEvent::Error(e)).await;
                                            } else {
                                                info!("Hot-reload completed successfully");
                                                let _ = tx
                                                    .send(HotReloadEvent::Reloaded(
                                                        path_clone.to_string_lossy().to_string(),
                                                    ))
                                                    .await;
                                            }
                                        });
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                    Err(_) => {
                        // Channel closed, exit
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Events from the hot-reload watcher
#[derive(Debug, Clone)]
pub enum HotReloadEvent {
    /// A file was reloaded successfully
    Reloaded(String),
    /// An error occurred during reload
    Error(String),
}
