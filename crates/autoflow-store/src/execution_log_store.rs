//! Execution log persistence: one row per workflow run.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::db::{Database, now_millis};
use crate::error::{StoreError, StoreResult};

/// A persisted run outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredExecutionLog {
    pub execution_id: String,
    pub workflow_id: String,
    pub status: String,
    /// Serialized execution result.
    pub result: serde_json::Value,
    pub recorded_at: i64,
}

/// Append-only access to the `execution_logs` table.
#[derive(Debug, Clone)]
pub struct ExecutionLogStore {
    db: Database,
}

impl ExecutionLogStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a run.  Recording the same execution id twice overwrites it.
    #[instrument(skip(self, result))]
    pub async fn record(
        &self,
        execution_id: &str,
        workflow_id: &str,
        status: &str,
        result: &serde_json::Value,
    ) -> StoreResult<()> {
        let execution_id = execution_id.to_string();
        let workflow_id = workflow_id.to_string();
        let status = status.to_string();
        let result = serde_json::to_string(result)?;
        let now = now_millis();

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO execution_logs (id, workflow_id, status, result, recorded_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![execution_id, workflow_id, status, result, now],
                )?;
                Ok(())
            })
            .await?;

        debug!("execution log recorded");
        Ok(())
    }

    /// The most recent `limit` runs of a workflow, newest first.
    #[instrument(skip(self))]
    pub async fn list_for_workflow(
        &self,
        workflow_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<StoredExecutionLog>> {
        let workflow_id = workflow_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, workflow_id, status, result, recorded_at FROM execution_logs \
                     WHERE workflow_id = ?1 ORDER BY recorded_at DESC, rowid DESC LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![workflow_id, limit], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, i64>(4)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(|(execution_id, workflow_id, status, result, recorded_at)| {
                        let result =
                            serde_json::from_str(&result).map_err(|e| StoreError::Corrupt {
                                entity: "execution log",
                                id: execution_id.clone(),
                                reason: e.to_string(),
                            })?;
                        Ok(StoredExecutionLog {
                            execution_id,
                            workflow_id,
                            status,
                            result,
                            recorded_at,
                        })
                    })
                    .collect()
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> StoreResult<i64> {
        self.db
            .execute(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM execution_logs", [], |row| row.get(0))?)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn record_and_list_newest_first() {
        let store = ExecutionLogStore::new(Database::in_memory_migrated().await.unwrap());
        store
            .record("e1", "w1", "completed", &json!({"succeeded": 1}))
            .await
            .unwrap();
        store
            .record("e2", "w1", "failed", &json!({"succeeded": 0}))
            .await
            .unwrap();
        store
            .record("e3", "w2", "completed", &json!({}))
            .await
            .unwrap();

        let logs = store.list_for_workflow("w1", 10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].execution_id, "e2");
        assert_eq!(logs[0].status, "failed");
        assert_eq!(logs[1].result, json!({"succeeded": 1}));

        assert_eq!(store.list_for_workflow("w1", 1).await.unwrap().len(), 1);
        assert_eq!(store.count().await.unwrap(), 3);
    }
}
