//! Agent instance registry with idle eviction.
//!
//! Instances are held in a `DashMap`.  Creation goes through the map's
//! entry API, which holds the shard lock for the key, so two concurrent
//! `get_or_create` calls for the same key always end up with the same
//! instance.  Per-instance work never touches the map lock.
//!
//! Eviction is lazy: an expired instance found on access is replaced, and a
//! full sweep runs at most once per sweep interval, piggybacked on calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::InstanceConfig;
use crate::instance::{AgentInstance, InstanceKey, InstanceStatus};

/// Owns every live [`AgentInstance`].
#[derive(Debug)]
pub struct InstanceManager {
    instances: DashMap<InstanceKey, Arc<AgentInstance>>,
    idle_ttl: Duration,
    sweep_interval: Duration,
    history_limit: usize,
    /// Unix milliseconds of the last sweep.
    last_sweep: AtomicI64,
}

impl InstanceManager {
    pub fn new(config: &InstanceConfig) -> Self {
        Self {
            instances: DashMap::new(),
            idle_ttl: config.idle_ttl(),
            sweep_interval: config.sweep_interval(),
            history_limit: config.history_limit,
            last_sweep: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    /// The live instance for the key, creating it if absent or expired.
    pub fn get_or_create(
        &self,
        agent_id: &str,
        session_id: &str,
        init_data: Value,
    ) -> Arc<AgentInstance> {
        self.get_or_create_at(agent_id, session_id, init_data, Utc::now())
    }

    /// [`InstanceManager::get_or_create`] with an explicit clock.
    pub fn get_or_create_at(
        &self,
        agent_id: &str,
        session_id: &str,
        init_data: Value,
        now: DateTime<Utc>,
    ) -> Arc<AgentInstance> {
        self.maybe_sweep(now);

        let key = InstanceKey::new(agent_id, session_id);
        let instance = match self.instances.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                // A running request keeps its instance even past the TTL.
                if current.is_expired(self.idle_ttl, now) && !current.is_busy() {
                    info!(agent_id, session_id, "replacing expired instance");
                    let fresh = Arc::new(self.build(key, init_data, now));
                    occupied.insert(Arc::clone(&fresh));
                    fresh
                } else {
                    Arc::clone(occupied.get())
                }
            }
            Entry::Vacant(vacant) => {
                debug!(agent_id, session_id, "creating instance");
                let fresh = Arc::new(self.build(key, init_data, now));
                vacant.insert(Arc::clone(&fresh));
                fresh
            }
        };
        instance.touch(now);
        instance
    }

    /// The live instance for the key, if any.  Does not create or touch.
    pub fn get(&self, agent_id: &str, session_id: &str) -> Option<Arc<AgentInstance>> {
        self.instances
            .get(&InstanceKey::new(agent_id, session_id))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Drop the instance for the key.  Returns whether one existed.
    pub fn remove(&self, agent_id: &str, session_id: &str) -> bool {
        let removed = self
            .instances
            .remove(&InstanceKey::new(agent_id, session_id))
            .is_some();
        if removed {
            info!(agent_id, session_id, "instance removed");
        }
        removed
    }

    /// Drop every instance.  Returns how many were live.
    pub fn force_cleanup_all(&self) -> usize {
        let count = self.instances.len();
        self.instances.clear();
        info!(count, "all instances cleared");
        count
    }

    /// Evict expired instances if the sweep interval has elapsed since the
    /// last sweep.  Returns the number evicted.
    pub fn maybe_sweep(&self, now: DateTime<Utc>) -> usize {
        let now_ms = now.timestamp_millis();
        let last = self.last_sweep.load(Ordering::Acquire);
        let interval_ms = i64::try_from(self.sweep_interval.as_millis()).unwrap_or(i64::MAX);
        if now_ms - last < interval_ms {
            return 0;
        }
        // Only one caller wins the right to sweep for this interval.
        if self
            .last_sweep
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return 0;
        }
        self.sweep(now)
    }

    /// Evict every instance idle longer than the TTL at `now`.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.instances.len();
        self.instances
            .retain(|_, instance| !instance.is_expired(self.idle_ttl, now) || instance.is_busy());
        let evicted = before.saturating_sub(self.instances.len());
        if evicted > 0 {
            info!(evicted, remaining = self.instances.len(), "idle instances evicted");
        }
        evicted
    }

    /// Status of every live instance, ordered by key.
    pub fn list_status(&self, now: DateTime<Utc>) -> Vec<InstanceStatus> {
        let mut statuses: Vec<InstanceStatus> = self
            .instances
            .iter()
            .map(|entry| entry.value().status(now))
            .collect();
        statuses.sort_by(|a, b| {
            (a.agent_id.as_str(), a.session_id.as_str())
                .cmp(&(b.agent_id.as_str(), b.session_id.as_str()))
        });
        statuses
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn build(&self, key: InstanceKey, init_data: Value, now: DateTime<Utc>) -> AgentInstance {
        AgentInstance::new(key, self.history_limit, init_data, now)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
