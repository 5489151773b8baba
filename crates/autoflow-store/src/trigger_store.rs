//! Trigger persistence.
//!
//! Triggers are created once and then only ever touched in two ways: the
//! scheduler stamps `last_triggered`, and the owner flips `status`.  There is
//! no delete.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A persisted trigger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTrigger {
    pub id: String,
    pub agent_id: String,
    pub workflow_id: String,
    /// `time_based`, `webhook`, `manual`, or `db_change`.
    pub trigger_type: String,
    pub config: serde_json::Value,
    /// `active` or `paused`.
    pub status: String,
    /// Unix milliseconds of the last firing.
    pub last_triggered: Option<i64>,
    pub created_at: i64,
}

// ═══════════════════════════════════════════════════════════════════════
//  TriggerStore
// ═══════════════════════════════════════════════════════════════════════

const SELECT_COLUMNS: &str = "SELECT id, agent_id, workflow_id, trigger_type, config, status, \
                              last_triggered, created_at FROM triggers";

/// Reads and writes on the `triggers` table.
#[derive(Debug, Clone)]
pub struct TriggerStore {
    db: Database,
}

impl TriggerStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new trigger.  Fails if the id exists or the workflow does not.
    #[instrument(skip(self, trigger), fields(trigger_id = %trigger.id, workflow_id = %trigger.workflow_id))]
    pub async fn create(&self, trigger: &StoredTrigger) -> StoreResult<()> {
        let t = trigger.clone();
        let config = serde_json::to_string(&t.config)?;

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO triggers (id, agent_id, workflow_id, trigger_type, config, status, last_triggered, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        t.id,
                        t.agent_id,
                        t.workflow_id,
                        t.trigger_type,
                        config,
                        t.status,
                        t.last_triggered,
                        t.created_at
                    ],
                )?;
                Ok(())
            })
            .await?;

        debug!("trigger created");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> StoreResult<Option<StoredTrigger>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                    rusqlite::params![id],
                    TriggerRow::from_row,
                );
                match result {
                    Ok(row) => row.into_stored().map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }

    /// All active triggers, oldest first.
    #[instrument(skip(self))]
    pub async fn list_active(&self) -> StoreResult<Vec<StoredTrigger>> {
        self.query(
            format!("{SELECT_COLUMNS} WHERE status = 'active' ORDER BY created_at, id"),
            None,
        )
        .await
    }

    /// All triggers owned by `agent_id`, oldest first.
    #[instrument(skip(self))]
    pub async fn list_for_agent(&self, agent_id: &str) -> StoreResult<Vec<StoredTrigger>> {
        self.query(
            format!("{SELECT_COLUMNS} WHERE agent_id = ?1 ORDER BY created_at, id"),
            Some(agent_id.to_string()),
        )
        .await
    }

    /// Stamp the time a trigger last fired.
    #[instrument(skip(self))]
    pub async fn update_last_triggered(&self, id: &str, at_millis: i64) -> StoreResult<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let updated = conn.execute(
                    "UPDATE triggers SET last_triggered = ?2 WHERE id = ?1",
                    rusqlite::params![id, at_millis],
                )?;
                if updated == 0 {
                    return Err(StoreError::NotFound {
                        entity: "trigger",
                        id,
                    });
                }
                Ok(())
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn set_status(&self, id: &str, status: &str) -> StoreResult<()> {
        let id = id.to_string();
        let status = status.to_string();
        self.db
            .execute(move |conn| {
                let updated = conn.execute(
                    "UPDATE triggers SET status = ?2 WHERE id = ?1",
                    rusqlite::params![id, status],
                )?;
                if updated == 0 {
                    return Err(StoreError::NotFound {
                        entity: "trigger",
                        id,
                    });
                }
                Ok(())
            })
            .await
    }

    async fn query(&self, sql: String, param: Option<String>) -> StoreResult<Vec<StoredTrigger>> {
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = match param {
                    Some(p) => stmt
                        .query_map(rusqlite::params![p], TriggerRow::from_row)?
                        .collect::<Result<Vec<_>, _>>()?,
                    None => stmt
                        .query_map([], TriggerRow::from_row)?
                        .collect::<Result<Vec<_>, _>>()?,
                };
                rows.into_iter().map(TriggerRow::into_stored).collect()
            })
            .await
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Internal row mapping
// ═══════════════════════════════════════════════════════════════════════

/// Raw row before the config column is parsed.
struct TriggerRow {
    id: String,
    agent_id: String,
    workflow_id: String,
    trigger_type: String,
    config: String,
    status: String,
    last_triggered: Option<i64>,
    created_at: i64,
}

impl TriggerRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            agent_id: row.get(1)?,
            workflow_id: row.get(2)?,
            trigger_type: row.get(3)?,
            config: row.get(4)?,
            status: row.get(5)?,
            last_triggered: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_stored(self) -> StoreResult<StoredTrigger> {
        let config = serde_json::from_str(&self.config).map_err(|e| StoreError::Corrupt {
            entity: "trigger",
            id: self.id.clone(),
            reason: format!("config is not JSON: {e}"),
        })?;
        Ok(StoredTrigger {
            id: self.id,
            agent_id: self.agent_id,
            workflow_id: self.workflow_id,
            trigger_type: self.trigger_type,
            config,
            status: self.status,
            last_triggered: self.last_triggered,
            created_at: self.created_at,
        })
    }
}

// ── tests ────────────────────────────────────────────────────────────
