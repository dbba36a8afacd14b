//! # Run Store
//!
//! Persistence collaborator for run status. The orchestrator calls it once,
//! after a successful deployment.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::db::RunDb;

/// Lifecycle status of a run as persisted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Deployed,
    Completed,
    Failed,
}

impl RunStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Deployed => "deployed",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "deployed" => Self::Deployed,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Running,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunStatusUpdate {
    pub status: RunStatus,
    pub completion_percentage: u8,
}

/// A persisted run row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: String,
    pub status: RunStatus,
    pub completion_percentage: u8,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn update_run_status(&self, run_id: &str, update: RunStatusUpdate) -> Result<()>;
}

/// In-process store, mostly for tests and the CLI
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    updates: Mutex<HashMap<String, Vec<RunStatusUpdate>>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every update recorded for `run_id`, oldest first
    pub fn updates(&self, run_id: &str) -> Vec<RunStatusUpdate> {
        self.updates
            .lock()
            .map(|updates| updates.get(run_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn update_run_status(&self, run_id: &str, update: RunStatusUpdate) -> Result<()> {
        self.updates
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?
            .entry(run_id.to_string())
            .or_default()
            .push(update);
        Ok(())
    }
}

/// SQLite-backed store
pub struct SqliteRunStore {
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl SqliteRunStore {
    pub fn new(db: &RunDb) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    /// Load the current row for `run_id`
    pub fn load(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let row = conn
            .query_row(
                "SELECT status, completion_percentage, updated_at FROM runs WHERE run_id = ?1",
                params![run_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .context("Failed to load run")?;

        let Some((status, percentage, updated_at)) = row else {
            return Ok(None);
        };
        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .context("Invalid updated_at timestamp")?
            .with_timezone(&Utc);

        Ok(Some(RunRecord {
            run_id: run_id.to_string(),
            status: RunStatus::from_str(&status),
            completion_percentage: percentage.clamp(0, 100) as u8,
            updated_at,
        }))
    }

    /// Number of status updates recorded for `run_id`
    pub fn history_len(&self, run_id: &str) -> Result<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM run_status_history WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn update_run_status(&self, run_id: &str, update: RunStatusUpdate) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT OR REPLACE INTO runs (run_id, status, completion_percentage, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                run_id,
                update.status.as_str(),
                update.completion_percentage,
                now
            ],
        )
        .context("Failed to save run status")?;

        conn.execute(
            "INSERT INTO run_status_history (run_id, status, completion_percentage, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                run_id,
                update.status.as_str(),
                update.completion_percentage,
                now
            ],
        )
        .context("Failed to append run status history")?;

        tracing::debug!(run_id = %run_id, status = update.status.as_str(), "Run status saved");
        Ok(())
    }
}
