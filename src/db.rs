//! Progress Persistence
//!
//! Sqlite-backed store for per-instance quest progress so state
//! survives process restarts. One row per (owner, quest_id); the
//! accumulated counts travel as a JSON map, and the live in-memory
//! instance remains authoritative between writes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Persisted progress row for one quest instance
#[derive(Debug, Clone)]
pub struct StoredProgress {
    pub accomplished: HashMap<u32, i32>,
    pub rewards_granted: bool,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub struct ProgressStore {
    pool: SqlitePool,
}

impl ProgressStore {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Self::migrate(&pool).await?;

        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quest_progress (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                quest_id TEXT NOT NULL,
                accomplished_json TEXT NOT NULL DEFAULT '{}',
                rewards_granted INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'active',
                started_at TEXT NOT NULL,
                completed_at TEXT,
                UNIQUE(owner, quest_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    /// Load the persisted row for an instance, if any
    pub async fn load(
        &self,
        owner: &str,
        quest_id: &str,
    ) -> Result<Option<StoredProgress>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT accomplished_json, rewards_granted, status, started_at, completed_at
             FROM quest_progress WHERE owner = ? AND quest_id = ?",
        )
        .bind(owner)
        .bind(quest_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let json: String = r.get("accomplished_json");
            let started: String = r.get("started_at");
            let completed: Option<String> = r.get("completed_at");
            StoredProgress {
                accomplished: counts_from_json(&json),
                rewards_granted: r.get::<i64, _>("rewards_granted") != 0,
                status: r.get("status"),
                started_at: parse_timestamp(&started),
                completed_at: completed.as_deref().map(parse_timestamp),
            }
        }))
    }

    /// Insert or update an instance's progress row
    pub async fn upsert(
        &self,
        owner: &str,
        quest_id: &str,
        accomplished: &HashMap<u32, i32>,
        rewards_granted: bool,
        started_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO quest_progress (owner, quest_id, accomplished_json, rewards_granted, started_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(owner, quest_id) DO UPDATE SET
                accomplished_json = excluded.accomplished_json,
                rewards_granted = excluded.rewards_granted
            "#,
        )
        .bind(owner)
        .bind(quest_id)
        .bind(counts_to_json(accomplished))
        .bind(rewards_granted as i64)
        .bind(started_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist the rewards-granted flag on its own, before the rest of
    /// the completion transaction runs. A retry after a later failure
    /// must see this flag.
    pub async fn mark_rewards_granted(
        &self,
        owner: &str,
        quest_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE quest_progress SET rewards_granted = 1 WHERE owner = ? AND quest_id = ?",
        )
        .bind(owner)
        .bind(quest_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Archive an instance after its completion transaction succeeds
    pub async fn mark_completed(
        &self,
        owner: &str,
        quest_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE quest_progress SET status = 'completed', completed_at = ?
             WHERE owner = ? AND quest_id = ?",
        )
        .bind(completed_at.to_rfc3339())
        .bind(owner)
        .bind(quest_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn counts_to_json(counts: &HashMap<u32, i32>) -> String {
    serde_json::to_string(counts).unwrap_or_else(|_| "{}".to_string())
}

fn counts_from_json(json: &str) -> HashMap<u32, i32> {
    serde_json::from_str(json).unwrap_or_default()
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
