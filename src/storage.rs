use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use uuid::Uuid;

use crate::models::{IdFilterMode, RunState, RunStats};

const CONFIG_KEY: &str = "harvest_config";

/// Settings persisted between invocations, stored as one JSON blob
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredConfig {
    pub credential: Option<String>,
    pub credential_saved_at: Option<DateTime<Utc>>,
    pub root_folder_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub id_filter_enabled: bool,
    pub id_filter_mode: IdFilterMode,
    pub target_ids: Vec<String>,
    pub report_resource_id: Option<String>,
    pub report_subsection: Option<String>,
}

/// One finished run, as kept in the history table
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub state: RunState,
    pub root_folder_id: String,
    pub stats: RunStats,
}

pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(database_path: &str) -> Result<Self> {
        // Create database if it doesn't exist
        if !Path::new(database_path).exists() {
            std::fs::File::create(database_path)?;
        }

        let database_url = format!("sqlite://{}", database_path);
        let pool = SqlitePool::connect(&database_url).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                state TEXT NOT NULL,
                root_folder_id TEXT NOT NULL,
                processed INTEGER NOT NULL,
                downloaded INTEGER NOT NULL,
                errors INTEGER NOT NULL,
                included INTEGER NOT NULL,
                excluded INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at)")
            .execute(&pool)
            .await?;

        Ok(Storage { pool })
    }

    /// Stored settings, or defaults when nothing was saved yet
    pub async fn load_config(&self) -> Result<StoredConfig> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(CONFIG_KEY)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let value: String = row.get("value");
                Ok(serde_json::from_str(&value)?)
            }
            None => Ok(StoredConfig::default()),
        }
    }

    pub async fn save_config(&self, config: &StoredConfig) -> Result<()> {
        let value = serde_json::to_string(config)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO settings (key, value, updated_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(CONFIG_KEY)
        .bind(&value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn record_run(&self, run: &RunRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, started_at, finished_at, state, root_folder_id,
             processed, downloaded, errors, included, excluded)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.id.to_string())
        .bind(run.started_at.to_rfc3339())
        .bind(run.finished_at.to_rfc3339())
        .bind(run.state.as_str())
        .bind(&run.root_folder_id)
        .bind(run.stats.processed as i64)
        .bind(run.stats.downloaded as i64)
        .bind(run.stats.errors as i64)
        .bind(run.stats.included as i64)
        .bind(run.stats.excluded as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent runs first
    pub async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query("SELECT * FROM runs ORDER BY started_at DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut runs = Vec::new();
        for row in rows {
            let id: String = row.get("id");
            let started_at: String = row.get("started_at");
            let finished_at: String = row.get("finished_at");
            let state: String = row.get("state");

            runs.push(RunRecord {
                id: Uuid::parse_str(&id)?,
                started_at: DateTime::parse_from_rfc3339(&started_at)?.with_timezone(&Utc),
                finished_at: DateTime::parse_from_rfc3339(&finished_at)?.with_timezone(&Utc),
                state: RunState::parse(&state)
                    .ok_or_else(|| anyhow!("Unknown run state in history: {}", state))?,
                root_folder_id: row.get("root_folder_id"),
                stats: RunStats {
                    processed: row.get::<i64, _>("processed") as u64,
                    downloaded: row.get::<i64, _>("downloaded") as u64,
                    errors: row.get::<i64, _>("errors") as u64,
                    included: row.get::<i64, _>("included") as u64,
                    excluded: row.get::<i64, _>("excluded") as u64,
                },
            });
        }

        Ok(runs)
    }
}
