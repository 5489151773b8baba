//! One isolated agent instance per `(agent_id, session_id)`.
//!
//! An instance owns its conversation history, the workflow it is waiting
//! to complete, and any open template choice.  All of that lives behind a
//! per-instance async mutex that is only ever taken with `try_lock`: a
//! second request arriving while the first is still being processed is
//! turned away as busy instead of interleaving with it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};

use autoflow_agent::ConversationHistory;
use autoflow_intent::{FreeformPlan, Template};

use crate::error::{Result, RuntimeError};

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

/// Identity of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
    pub agent_id: String,
    pub session_id: String,
}

impl InstanceKey {
    pub fn new(agent_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.agent_id, self.session_id)
    }
}

// ---------------------------------------------------------------------------
// Private state
// ---------------------------------------------------------------------------

/// What a pending workflow is recompiled from.
#[derive(Debug, Clone)]
pub enum PendingSource {
    Template(Arc<Template>),
    Plan(FreeformPlan),
}

impl PendingSource {
    pub fn name(&self) -> &str {
        match self {
            Self::Template(t) => &t.name,
            Self::Plan(p) => &p.name,
        }
    }
}

/// A compiled-but-invalid workflow waiting for the user to supply inputs.
#[derive(Debug, Clone)]
pub struct PendingWorkflow {
    pub source: PendingSource,
    pub parameters: BTreeMap<String, String>,
    pub missing: Vec<String>,
}

/// Templates offered to the user, waiting for a pick.
#[derive(Debug, Clone)]
pub struct SelectionState {
    pub options: Vec<Arc<Template>>,
    pub parameters: BTreeMap<String, String>,
}

/// Everything an instance keeps between messages.
#[derive(Debug)]
pub struct InstanceState {
    pub history: ConversationHistory,
    pub pending: Option<PendingWorkflow>,
    pub selection: Option<SelectionState>,
    /// Caller-supplied data from instance creation.
    pub init_data: Value,
}

impl InstanceState {
    /// Forget any half-finished workflow or open choice.
    pub fn reset_flow(&mut self) {
        self.pending = None;
        self.selection = None;
    }
}

// ---------------------------------------------------------------------------
// AgentInstance
// ---------------------------------------------------------------------------

/// A live instance.  Shared as `Arc<AgentInstance>` by the manager.
pub struct AgentInstance {
    key: InstanceKey,
    created_at: DateTime<Utc>,
    /// Unix milliseconds of the last access.
    last_accessed: AtomicI64,
    state: Mutex<InstanceState>,
}

impl AgentInstance {
    pub fn new(key: InstanceKey, history_limit: usize, init_data: Value, now: DateTime<Utc>) -> Self {
        Self {
            key,
            created_at: now,
            last_accessed: AtomicI64::new(now.timestamp_millis()),
            state: Mutex::new(InstanceState {
                history: ConversationHistory::new(history_limit),
                pending: None,
                selection: None,
                init_data,
            }),
        }
    }

    pub fn key(&self) -> &InstanceKey {
        &self.key
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        let millis = self.last_accessed.load(Ordering::Acquire);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or(self.created_at)
    }

    /// Record an access at `now`.  Never moves the clock backwards.
    pub fn touch(&self, now: DateTime<Utc>) {
        self.last_accessed
            .fetch_max(now.timestamp_millis(), Ordering::AcqRel);
    }

    /// Whether the instance has been idle for longer than `ttl` at `now`.
    pub fn is_expired(&self, ttl: std::time::Duration, now: DateTime<Utc>) -> bool {
        let idle = now.timestamp_millis() - self.last_accessed.load(Ordering::Acquire);
        idle > i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
    }

    /// Exclusive access to the private state, or `Busy` if another request
    /// holds it.
    pub fn try_begin(&self) -> Result<MutexGuard<'_, InstanceState>> {
        self.state.try_lock().map_err(|_| RuntimeError::Busy {
            agent_id: self.key.agent_id.clone(),
            session_id: self.key.session_id.clone(),
        })
    }

    /// Whether a request is currently being processed.
    pub fn is_busy(&self) -> bool {
        self.state.try_lock().is_err()
    }

    /// Snapshot for status listings.  Busy instances report what is known
    /// without waiting for the lock.
    pub fn status(&self, now: DateTime<Utc>) -> InstanceStatus {
        let idle_secs = (now - self.last_accessed()).num_seconds().max(0);
        let (history_len, has_pending, awaiting_selection, busy) = match self.state.try_lock() {
            Ok(state) => (
                state.history.len(),
                state.pending.is_some(),
                state.selection.is_some(),
                false,
            ),
            Err(_) => (0, false, false, true),
        };
        InstanceStatus {
            agent_id: self.key.agent_id.clone(),
            session_id: self.key.session_id.clone(),
            created_at: self.created_at,
            last_accessed: self.last_accessed(),
            idle_secs,
            history_len,
            has_pending_workflow: has_pending,
            awaiting_selection,
            busy,
        }
    }
}

impl fmt::Debug for AgentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentInstance")
            .field("key", &self.key)
            .field("created_at", &self.created_at)
            .field("last_accessed", &self.last_accessed())
            .finish_non_exhaustive()
    }
}

/// One row of `list_instances_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub agent_id: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub idle_secs: i64,
    pub history_len: usize,
    pub has_pending_workflow: bool,
    pub awaiting_selection: bool,
    pub busy: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
