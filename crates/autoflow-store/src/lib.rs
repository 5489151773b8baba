//! # autoflow-store
//!
//! SQLite persistence for autoflow.
//!
//! A single [`Database`] handle (WAL mode, versioned migrations) backs four
//! narrow stores, one per table family:
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  WorkflowStore       TriggerStore             │
//! │  ExecutionLogStore   ConversationStore        │
//! ├───────────────────────────────────────────────┤
//! │  Database (rusqlite WAL, spawn_blocking)      │
//! │  Migrations (versioned, transactional)        │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Rows carry serialized JSON documents; typing them is the caller's job.
//! Every timestamp column holds unix milliseconds.
//!
//! ## Quick start
//!
//! ```ignore
//! use autoflow_store::{Database, TriggerStore};
//!
//! let db = Database::open_and_migrate("data/autoflow.db").await?;
//! let triggers = TriggerStore::new(db.clone());
//! let active = triggers.list_active().await?;
//! ```

pub mod conversation_store;
pub mod db;
pub mod error;
pub mod execution_log_store;
pub mod migration;
pub mod trigger_store;
pub mod workflow_store;

// ── re-exports ───────────────────────────────────────────────────────

pub use conversation_store::{ConversationStore, StoredMessage};
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use execution_log_store::{ExecutionLogStore, StoredExecutionLog};
pub use trigger_store::{StoredTrigger, TriggerStore};
pub use workflow_store::{StoredWorkflow, WorkflowStore};
