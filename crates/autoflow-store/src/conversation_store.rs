//! Conversation log persistence.
//!
//! Every agent instance appends its user and assistant turns here.  The live
//! instance keeps its own bounded in-memory history; this table is the
//! durable record and is never read back into a running instance.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::db::{Database, now_millis};
use crate::error::StoreResult;

/// One logged turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub agent_id: String,
    pub session_id: String,
    /// `user` or `assistant`.
    pub role: String,
    pub content: String,
    pub created_at: i64,
}

/// Append and read access to `conversation_messages`.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    db: Database,
}

impl ConversationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a turn and return its row id.
    #[instrument(skip(self, content))]
    pub async fn append(
        &self,
        agent_id: &str,
        session_id: &str,
        role: &str,
        content: &str,
    ) -> StoreResult<i64> {
        let agent_id = agent_id.to_string();
        let session_id = session_id.to_string();
        let role = role.to_string();
        let content = content.to_string();
        let now = now_millis();

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO conversation_messages (agent_id, session_id, role, content, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![agent_id, session_id, role, content, now],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
    }

    /// The latest `limit` turns of one conversation, oldest first.
    #[instrument(skip(self))]
    pub async fn recent(
        &self,
        agent_id: &str,
        session_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<StoredMessage>> {
        let agent_id = agent_id.to_string();
        let session_id = session_id.to_string();

        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, agent_id, session_id, role, content, created_at FROM ( \
                        SELECT * FROM conversation_messages \
                        WHERE agent_id = ?1 AND session_id = ?2 \
                        ORDER BY id DESC LIMIT ?3 \
                     ) ORDER BY id ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![agent_id, session_id, limit], |row| {
                        Ok(StoredMessage {
                            id: row.get(0)?,
                            agent_id: row.get(1)?,
                            session_id: row.get(2)?,
                            role: row.get(3)?,
                            content: row.get(4)?,
                            created_at: row.get(5)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}
