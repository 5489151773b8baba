//! Application configuration.
//!
//! [`AppConfig`] is read from a TOML file (every section optional), then
//! overridden by `AUTOFLOW_*` environment variables, then validated.
//!
//! ```toml
//! [scheduler]
//! poll_interval_secs = 30
//!
//! [instances]
//! idle_ttl_hours = 2.0
//!
//! [execution]
//! continue_on_failure = true
//!
//! [llm]
//! provider = "anthropic"
//! model = "claude-sonnet-4-20250514"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use autoflow_intent::{ExecutionConfig, MatchingConfig, SchedulerConfig};

use crate::error::{Result, RuntimeError};

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Prefix of every environment override.
const ENV_PREFIX: &str = "AUTOFLOW_";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Agent instance lifecycle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Instances idle longer than this are evicted.
    pub idle_ttl_hours: f64,
    /// Minimum time between two eviction sweeps.
    pub sweep_interval_secs: u64,
    /// Conversation turns kept per instance.
    pub history_limit: usize,
    /// Recent turns handed to the classifier.
    pub context_window: usize,
}

impl InstanceConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs_f64(self.idle_ttl_hours.max(0.0) * 3600.0)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            idle_ttl_hours: 2.0,
            sweep_interval_secs: 300,
            history_limit: 50,
            context_window: 6,
        }
    }
}

/// Which completion service backs the classifier and planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    Anthropic,
    Openai,
    /// No model; keyword fallback only and no freeform plans.
    None,
}

/// Language-model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: LlmProviderKind,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Override for OpenAI-compatible endpoints.
    pub base_url: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::None,
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
        }
    }
}

/// Where persistent state lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    /// Keep everything in memory; nothing survives a restart.
    pub ephemeral: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/autoflow.db"),
            ephemeral: false,
        }
    }
}

/// Extra template sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// A TOML catalog merged after the built-in one.
    pub catalog_path: Option<PathBuf>,
}

/// HTTP listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub instances: InstanceConfig,
    pub execution: ExecutionConfig,
    pub matching: MatchingConfig,
    pub llm: LlmSettings,
    pub storage: StorageConfig,
    pub templates: TemplateConfig,
    pub web: WebConfig,
}

impl AppConfig {
    /// Parse a TOML document.  Missing sections take their defaults.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|source| RuntimeError::ConfigParse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Read a TOML file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| RuntimeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    /// Full load: file (defaults if absent), environment overrides, validation.
    ///
    /// An explicitly given `path` must exist; the default path may be missing.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_path(p)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_path(default)?
                } else {
                    debug!("no config file found, using defaults");
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `AUTOFLOW_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = get("POLL_INTERVAL_SECS") {
            self.scheduler.poll_interval_secs = parse_env("POLL_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("IDLE_TTL_HOURS") {
            self.instances.idle_ttl_hours = parse_env("IDLE_TTL_HOURS", &v)?;
        }
        if let Some(v) = get("STEP_TIMEOUT_SECS") {
            self.execution.step_timeout_secs = parse_env("STEP_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("CONTINUE_ON_FAILURE") {
            self.execution.continue_on_failure = parse_env("CONTINUE_ON_FAILURE", &v)?;
        }
        if let Some(v) = get("AUTO_SELECT_SCORE") {
            self.matching.auto_select_score = parse_env("AUTO_SELECT_SCORE", &v)?;
        }
        if let Some(v) = get("AUTO_SELECT_CONFIDENCE") {
            self.matching.auto_select_confidence = parse_env("AUTO_SELECT_CONFIDENCE", &v)?;
        }
        if let Some(v) = get("LLM_PROVIDER") {
            self.llm.provider = match v.to_ascii_lowercase().as_str() {
                "anthropic" => LlmProviderKind::Anthropic,
                "openai" => LlmProviderKind::Openai,
                "none" | "" => LlmProviderKind::None,
                other => {
                    return Err(RuntimeError::InvalidConfig {
                        reason: format!("{ENV_PREFIX}LLM_PROVIDER: unknown provider `{other}`"),
                    });
                }
            };
        }
        if let Some(v) = get("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(v);
        }
        if let Some(v) = get("EPHEMERAL") {
            self.storage.ephemeral = parse_env("EPHEMERAL", &v)?;
        }
        if let Some(v) = get("WEB_PORT") {
            self.web.port = parse_env("WEB_PORT", &v)?;
        }
        Ok(())
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(RuntimeError::InvalidConfig { reason });

        if self.scheduler.poll_interval_secs == 0 {
            return invalid("scheduler.poll_interval_secs must be at least 1".into());
        }
        if !(self.instances.idle_ttl_hours.is_finite() && self.instances.idle_ttl_hours > 0.0) {
            return invalid("instances.idle_ttl_hours must be a positive number".into());
        }
        if self.instances.history_limit == 0 {
            return invalid("instances.history_limit must be at least 1".into());
        }
        if self.execution.step_timeout_secs == 0 {
            return invalid("execution.step_timeout_secs must be at least 1".into());
        }
        for (name, value) in [
            ("matching.auto_select_score", self.matching.auto_select_score),
            (
                "matching.auto_select_confidence",
                self.matching.auto_select_confidence,
            ),
            ("matching.min_candidate_score", self.matching.min_candidate_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} must be within 0..=1, got {value}"));
            }
        }
        if self.matching.candidate_limit == 0 {
            return invalid("matching.candidate_limit must be at least 1".into());
        }
        if self.llm.provider != LlmProviderKind::None && self.llm.model.trim().is_empty() {
            return invalid("llm.model must be set when a provider is configured".into());
        }
        if self.execution.concurrent && !self.execution.continue_on_failure {
            warn!("fail-fast with concurrent execution stops only between waves");
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RuntimeError::InvalidConfig {
            reason: format!("{ENV_PREFIX}{name}: cannot parse `{value}`"),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
