//! Trigger model -- persisted rules for when a stored workflow fires.
//!
//! Only `time_based` triggers are due from polling.  `webhook` and `manual`
//! triggers fire through [`TriggerScheduler::fire`](crate::scheduler::TriggerScheduler::fire)
//! and `db_change` is never due.
//!
//! A time-based config is either an interval or a cron expression:
//!
//! ```json
//! {"interval": 60, "unit": "minutes"}
//! {"cron": "0 9 * * Mon-Fri"}
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::error::{IntentError, Result};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What causes a trigger to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    TimeBased,
    Webhook,
    Manual,
    DbChange,
}

impl TriggerType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TimeBased => "time_based",
            Self::Webhook => "webhook",
            Self::Manual => "manual",
            Self::DbChange => "db_change",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = IntentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "time_based" => Ok(Self::TimeBased),
            "webhook" => Ok(Self::Webhook),
            "manual" => Ok(Self::Manual),
            "db_change" => Ok(Self::DbChange),
            other => Err(IntentError::InvalidTriggerConfig {
                reason: format!("unknown trigger type `{other}`"),
            }),
        }
    }
}

/// Whether polling considers a trigger at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    #[default]
    Active,
    Paused,
}

impl TriggerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }
}

impl fmt::Display for TriggerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerStatus {
    type Err = IntentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            other => Err(IntentError::InvalidTriggerConfig {
                reason: format!("unknown trigger status `{other}`"),
            }),
        }
    }
}

/// Unit of an interval schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Minutes,
    Hours,
    Days,
}

impl IntervalUnit {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m" | "min" | "mins" | "minute" | "minutes" => Some(Self::Minutes),
            "h" | "hour" | "hours" => Some(Self::Hours),
            "d" | "day" | "days" => Some(Self::Days),
            _ => None,
        }
    }
}

/// A parsed time-based schedule.
#[derive(Debug, Clone)]
pub enum TimeSchedule {
    Interval { every: u64, unit: IntervalUnit },
    Cron {
        expression: String,
        schedule: cron::Schedule,
    },
}

impl TimeSchedule {
    /// Parse a time-based trigger config.
    pub fn from_config(config: &Value) -> Result<Self> {
        if let Some(expr) = config.get("cron") {
            let expression = expr.as_str().ok_or_else(|| IntentError::InvalidTriggerConfig {
                reason: "`cron` must be a string".to_string(),
            })?;
            return Ok(Self::Cron {
                expression: expression.to_string(),
                schedule: parse_cron(expression)?,
            });
        }

        let raw = config
            .get("interval")
            .ok_or_else(|| IntentError::InvalidTriggerConfig {
                reason: "time_based trigger needs `interval` or `cron`".to_string(),
            })?;
        let every = match raw {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
        .filter(|n| *n >= 1)
        .ok_or_else(|| IntentError::InvalidTriggerConfig {
            reason: format!("interval must be a positive integer, got {raw}"),
        })?;

        let unit = match config.get("unit") {
            None | Some(Value::Null) => IntervalUnit::Minutes,
            Some(Value::String(s)) => {
                IntervalUnit::parse(s).ok_or_else(|| IntentError::InvalidTriggerConfig {
                    reason: format!("unknown interval unit `{s}`"),
                })?
            }
            Some(other) => {
                return Err(IntentError::InvalidTriggerConfig {
                    reason: format!("unit must be a string, got {other}"),
                });
            }
        };

        // Reject intervals chrono cannot represent up front.
        let schedule = Self::Interval { every, unit };
        schedule.interval()?;
        Ok(schedule)
    }

    fn interval(&self) -> Result<Option<TimeDelta>> {
        let Self::Interval { every, unit } = self else {
            return Ok(None);
        };
        let n = i64::try_from(*every).ok();
        let delta = n.and_then(|n| match unit {
            IntervalUnit::Minutes => TimeDelta::try_minutes(n),
            IntervalUnit::Hours => TimeDelta::try_hours(n),
            IntervalUnit::Days => TimeDelta::try_days(n),
        });
        delta
            .map(Some)
            .ok_or_else(|| IntentError::InvalidTriggerConfig {
                reason: format!("interval {every} is too large"),
            })
    }

    /// The first instant at or after which a firing is due.
    pub fn next_due(&self, last_triggered: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        match self {
            Self::Interval { .. } => Ok(self
                .interval()?
                .and_then(|d| last_triggered.checked_add_signed(d))),
            Self::Cron { schedule, .. } => Ok(schedule.after(&last_triggered).next()),
        }
    }
}

/// Prepend a seconds field to standard 5-field expressions.
fn normalize_cron_expr(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

fn parse_cron(expr: &str) -> Result<cron::Schedule> {
    cron::Schedule::from_str(&normalize_cron_expr(expr)).map_err(|e| {
        IntentError::InvalidCronExpression {
            expression: expr.to_string(),
            reason: e.to_string(),
        }
    })
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// A persisted firing rule for one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub trigger_id: Uuid,
    pub agent_id: String,
    pub workflow_id: Uuid,
    pub trigger_type: TriggerType,
    pub config: Value,
    pub status: TriggerStatus,
    pub last_triggered: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Trigger {
    /// A new active trigger.  Time-based configs are validated here.
    pub fn new(
        agent_id: impl Into<String>,
        workflow_id: Uuid,
        trigger_type: TriggerType,
        config: Value,
    ) -> Result<Self> {
        if trigger_type == TriggerType::TimeBased {
            TimeSchedule::from_config(&config)?;
        }
        Ok(Self {
            trigger_id: Uuid::now_v7(),
            agent_id: agent_id.into(),
            workflow_id,
            trigger_type,
            config,
            status: TriggerStatus::Active,
            last_triggered: None,
            created_at: Utc::now(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == TriggerStatus::Active
    }

    /// The parsed schedule for time-based triggers.
    pub fn schedule(&self) -> Result<Option<TimeSchedule>> {
        match self.trigger_type {
            TriggerType::TimeBased => TimeSchedule::from_config(&self.config).map(Some),
            _ => Ok(None),
        }
    }

    /// Whether polling should fire this trigger at `now`.
    pub fn check_due(&self, now: DateTime<Utc>) -> Result<bool> {
        if !self.is_active() {
            return Ok(false);
        }
        let Some(schedule) = self.schedule()? else {
            return Ok(false);
        };
        let Some(last) = self.last_triggered else {
            return Ok(true);
        };
        Ok(schedule.next_due(last)?.is_some_and(|due| now >= due))
    }

    /// [`check_due`](Self::check_due) with a broken config treated as never
    /// due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.check_due(now).unwrap_or_else(|e| {
            warn!(trigger_id = %self.trigger_id, error = %e, "trigger config unusable");
            false
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
