//! Tunables for matching, execution, and scheduling.
//!
//! Each struct deserializes with every field defaulted so that the runtime's
//! TOML config can embed them as sections and omit anything unchanged.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Template matching thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Top score must exceed this to skip presenting options.
    pub auto_select_score: f64,
    /// Intent confidence must exceed this to skip presenting options.
    pub auto_select_confidence: f64,
    /// Candidates scoring below this are dropped.
    pub min_candidate_score: f64,
    /// Maximum number of candidates returned.
    pub candidate_limit: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            auto_select_score: 0.7,
            auto_select_confidence: 0.8,
            min_candidate_score: 0.3,
            candidate_limit: 3,
        }
    }
}

/// Execution engine policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Per-driver-call timeout.
    pub step_timeout_secs: u64,
    /// Keep running independent steps after a failure.
    pub continue_on_failure: bool,
    /// Run independent ready steps together in waves.
    pub concurrent: bool,
    /// Extra attempts for a failed driver call.
    pub max_retries: u32,
    /// Base delay before the first retry; doubles per attempt.
    pub retry_delay_ms: u64,
}

impl ExecutionConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: 30,
            continue_on_failure: true,
            concurrent: false,
            max_retries: 0,
            retry_delay_ms: 250,
        }
    }
}

/// Trigger polling cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between polling ticks.
    pub poll_interval_secs: u64,
    /// Extra wait after a tick fails as a whole.
    pub error_backoff_secs: u64,
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            error_backoff_secs: 60,
        }
    }
}
