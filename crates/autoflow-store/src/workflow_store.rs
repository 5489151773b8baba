//! Compiled workflow persistence.
//!
//! A workflow row holds the serialized workflow document next to a few
//! columns lifted out of it for querying (owner, name, validity).  The
//! document is the source of truth; the caller decodes and version-checks it.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::db::{Database, now_millis};
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A persisted workflow document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredWorkflow {
    /// Workflow id (UUID v7, hyphenated).
    pub id: String,
    /// Agent that owns the workflow.
    pub agent_id: String,
    pub name: String,
    /// Template the workflow was compiled from, if any.
    pub template_id: Option<String>,
    /// Schema version of `document`.
    pub schema_version: u32,
    /// Serialized workflow (JSON).
    pub document: String,
    pub is_valid: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl StoredWorkflow {
    /// A record ready for [`WorkflowStore::save`]; timestamps are set on write.
    pub fn new(
        id: impl Into<String>,
        agent_id: impl Into<String>,
        name: impl Into<String>,
        template_id: Option<String>,
        schema_version: u32,
        document: impl Into<String>,
        is_valid: bool,
    ) -> Self {
        Self {
            id: id.into(),
            agent_id: agent_id.into(),
            name: name.into(),
            template_id,
            schema_version,
            document: document.into(),
            is_valid,
            created_at: 0,
            updated_at: 0,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  WorkflowStore
// ═══════════════════════════════════════════════════════════════════════

const SELECT_COLUMNS: &str = "SELECT id, agent_id, name, template_id, schema_version, document, \
                              is_valid, created_at, updated_at FROM workflows";

/// Reads and writes on the `workflows` table.
#[derive(Debug, Clone)]
pub struct WorkflowStore {
    db: Database,
}

impl WorkflowStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a workflow, or replace the document of an existing one.
    ///
    /// `created_at` survives a replace; `updated_at` is always bumped.
    #[instrument(skip(self, workflow), fields(workflow_id = %workflow.id, agent_id = %workflow.agent_id))]
    pub async fn save(&self, workflow: &StoredWorkflow) -> StoreResult<()> {
        let w = workflow.clone();
        let now = now_millis();

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO workflows (id, agent_id, name, template_id, schema_version, document, is_valid, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8) \
                     ON CONFLICT(id) DO UPDATE SET \
                        agent_id = excluded.agent_id, \
                        name = excluded.name, \
                        template_id = excluded.template_id, \
                        schema_version = excluded.schema_version, \
                        document = excluded.document, \
                        is_valid = excluded.is_valid, \
                        updated_at = excluded.updated_at",
                    rusqlite::params![
                        w.id,
                        w.agent_id,
                        w.name,
                        w.template_id,
                        w.schema_version,
                        w.document,
                        w.is_valid,
                        now
                    ],
                )?;
                Ok(())
            })
            .await?;

        debug!("workflow saved");
        Ok(())
    }

    /// Fetch one workflow, or `None` if the id is unknown.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> StoreResult<Option<StoredWorkflow>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                    rusqlite::params![id],
                    map_row,
                );
                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }

    /// Every workflow owned by `agent_id`, most recently updated first.
    #[instrument(skip(self))]
    pub async fn list_for_agent(&self, agent_id: &str) -> StoreResult<Vec<StoredWorkflow>> {
        let agent_id = agent_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_COLUMNS} WHERE agent_id = ?1 ORDER BY updated_at DESC, id DESC"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![agent_id], map_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> StoreResult<i64> {
        self.db
            .execute(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM workflows", [], |row| row.get(0))?))
            .await
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredWorkflow> {
    Ok(StoredWorkflow {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        name: row.get(2)?,
        template_id: row.get(3)?,
        schema_version: row.get(4)?,
        document: row.get(5)?,
        is_valid: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> WorkflowStore {
        WorkflowStore::new(Database::in_memory_migrated().await.unwrap())
    }

    fn record(id: &str, agent: &str) -> StoredWorkflow {
        StoredWorkflow::new(
            id,
            agent,
            "Welcome email",
            Some("welcome-email".into()),
            1,
            r#"{"steps":[]}"#,
            true,
        )
    }

    #[tokio::test]
    async fn save_and_get_roundtrip() {
        let store = store().await;
        store.save(&record("w1", "agent1")).await.unwrap();

        let fetched = store.get("w1").await.unwrap().unwrap();
        assert_eq!(fetched.agent_id, "agent1");
        assert_eq!(fetched.template_id.as_deref(), Some("welcome-email"));
        assert_eq!(fetched.document, r#"{"steps":[]}"#);
        assert!(fetched.is_valid);
        assert!(fetched.created_at > 0);
        assert_eq!(fetched.created_at, fetched.updated_at);
    }

    #[tokio::test]
    async fn get_unknown_is_none() {
        let store = store().await;
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_replaces_document_and_keeps_created_at() {
        let store = store().await;
        store.save(&record("w1", "agent1")).await.unwrap();
        let first = store.get("w1").await.unwrap().unwrap();

        let mut changed = record("w1", "agent1");
        changed.document = r#"{"steps":[1]}"#.into();
        changed.is_valid = false;
        store.save(&changed).await.unwrap();

        let second = store.get("w1").await.unwrap().unwrap();
        assert_eq!(second.document, r#"{"steps":[1]}"#);
        assert!(!second.is_valid);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_is_scoped_to_agent() {
        let store = store().await;
        store.save(&record("w1", "agent1")).await.unwrap();
        store.save(&record("w2", "agent2")).await.unwrap();
        store.save(&record("w3", "agent1")).await.unwrap();

        let ids: Vec<String> = store
            .list_for_agent("agent1")
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"w1".to_string()));
        assert!(ids.contains(&"w3".to_string()));
    }
}
