use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use dashmap::DashMap;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use mudquest_server::catalog::{NameDirectory, QuestCatalog, DEFAULT_RECORD_CATALOGS};
use mudquest_server::db::ProgressStore;
use mudquest_server::loot::WeightedLoot;
use mudquest_server::ports::{Inventory, InventoryError, ItemGrant};
use mudquest_server::quest::{Collaborators, CompleteError, GameplayEvent, QuestEngine};
use mudquest_server::script::LuaActionRunner;

// ============================================================================
// App State
// ============================================================================

/// In-process inventory backing the engine's inventory port. The real
/// game wires its object subsystem here; the server binary keeps
/// holdings in memory per player.
struct MemoryInventory {
    holdings: DashMap<String, HashMap<String, i32>>,
}

impl MemoryInventory {
    fn new() -> Self {
        Self {
            holdings: DashMap::new(),
        }
    }
}

impl Inventory for MemoryInventory {
    fn add_items(&self, owner: &str, items: &[ItemGrant]) {
        let mut entry = self.holdings.entry(owner.to_string()).or_default();
        for grant in items {
            *entry.entry(grant.item.clone()).or_insert(0) += grant.count;
        }
    }

    fn remove_items(&self, owner: &str, items: &[(String, i32)]) -> Result<(), InventoryError> {
        let mut entry = self.holdings.entry(owner.to_string()).or_default();

        // Check the whole batch before touching anything
        for (item, need) in items {
            let have = entry.get(item).copied().unwrap_or(0);
            if have < *need {
                return Err(InventoryError::Shortfall {
                    item: item.clone(),
                    need: *need,
                    have,
                });
            }
        }

        for (item, need) in items {
            if let Some(count) = entry.get_mut(item) {
                *count -= need;
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
struct AppState {
    engine: Arc<QuestEngine>,
    inventory: Arc<MemoryInventory>,
}

impl AppState {
    async fn new() -> Self {
        let data_dir = std::path::Path::new("data");

        let store = Arc::new(
            ProgressStore::new("sqlite:quests.db?mode=rwc")
                .await
                .expect("Failed to initialize progress store"),
        );

        let catalog = Arc::new(QuestCatalog::new(data_dir));
        if let Err(e) = catalog.load_all().await {
            error!("Failed to load quest catalog: {}", e);
        }

        let names = Arc::new(NameDirectory::load(data_dir, DEFAULT_RECORD_CATALOGS));
        let inventory = Arc::new(MemoryInventory::new());

        let engine = Arc::new(QuestEngine::new(
            Arc::clone(&catalog),
            store,
            Collaborators {
                rewards: Arc::new(WeightedLoot::new()),
                inventory: Arc::clone(&inventory) as Arc<dyn Inventory>,
                actions: Arc::new(LuaActionRunner::new()),
                npc_names: Arc::clone(&names) as _,
                record_names: names as _,
            },
        ));

        // Hot-reload quest TOML during development
        match catalog.start_file_watcher() {
            Ok(mut rx) => {
                tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        info!("Catalog hot-reload: {:?}", event);
                    }
                });
            }
            Err(e) => warn!("Quest hot-reload unavailable: {}", e),
        }

        Self { engine, inventory }
    }
}

// ============================================================================
// HTTP Handlers
// ============================================================================

async fn health_check() -> &'static str {
    "ok"
}

async fn assign_quest(
    State(state): State<AppState>,
    Path((player, quest_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.engine.assign(&player, &quest_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("Quest assignment failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn post_event(
    State(state): State<AppState>,
    Path(player): Path<String>,
    Json(event): Json<GameplayEvent>,
) -> impl IntoResponse {
    match state.engine.on_gameplay_event(&player, &event).await {
        Ok(updates) => Json(updates).into_response(),
        Err(e) => {
            error!("Event routing failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[derive(Serialize)]
struct CompleteResponse {
    completed: bool,
}

async fn complete_quest(
    State(state): State<AppState>,
    Path((player, quest_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.engine.check_and_complete(&player, &quest_id).await {
        Ok(completed) => Json(CompleteResponse { completed }).into_response(),
        Err(CompleteError::TurnIn(e)) => (StatusCode::CONFLICT, e.to_string()).into_response(),
        Err(e) => {
            error!("Quest completion failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn list_quests(
    State(state): State<AppState>,
    Path(player): Path<String>,
) -> impl IntoResponse {
    Json(state.engine.active_quests(&player))
}

async fn quest_progress(
    State(state): State<AppState>,
    Path((player, quest_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.engine.describe(&player, &quest_id).await {
        Some(entries) => Json(entries).into_response(),
        None => (StatusCode::NOT_FOUND, "no such quest instance").into_response(),
    }
}

async fn grant_items(
    State(state): State<AppState>,
    Path(player): Path<String>,
    Json(items): Json<Vec<ItemGrant>>,
) -> impl IntoResponse {
    state.inventory.add_items(&player, &items);
    StatusCode::NO_CONTENT
}

// ============================================================================
// Server
// ============================================================================

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mudquest_server=info".parse().unwrap()),
        )
        .init();

    let state = AppState::new().await;

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/players/:player/quests", get(list_quests))
        .route(
            "/players/:player/quests/:quest_id",
            get(quest_progress).post(assign_quest),
        )
        .route("/players/:player/quests/:quest_id/complete", post(complete_quest))
        .route("/players/:player/events", post(post_event))
        .route("/players/:player/inventory", post(grant_items))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([axum::http::header::CONTENT_TYPE]),
        )
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 2567));
    info!("Quest server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
