//! Scheduler and engine configuration

use crate::error::{SchedulerError, SchedulerResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding [SchedulerConfig::expiration_delay_ms]
pub const EXPIRATION_DELAY_ENV: &str = "LINTEL_ANALYSIS_EXPIRATION_DELAY_MS";

/// Tuning of the scheduler itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Name of the consumer thread
    #[serde(default = "default_worker_name")]
    pub worker_name: String,
    /// How long a command may wait without becoming ready before it is dropped
    #[serde(default = "default_expiration_delay_ms")]
    pub expiration_delay_ms: u64,
}

fn default_worker_name() -> String {
    "lintel-analysis-scheduler".to_string()
}

fn default_expiration_delay_ms() -> u64 {
    60_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_name: default_worker_name(),
            expiration_delay_ms: default_expiration_delay_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Parse a JSON document, filling missing fields with defaults
    pub fn from_json(json: &str) -> SchedulerResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> SchedulerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        let value = std::env::var(EXPIRATION_DELAY_ENV).ok();
        self.with_expiration_override(value.as_deref())
    }

    fn with_expiration_override(mut self, value: Option<&str>) -> Self {
        let Some(raw) = value else {
            return self;
        };
        match raw.trim().parse::<u64>() {
            Ok(ms) => {
                tracing::debug!(
                    "overriding analysis expiration delay with value from {}: {}ms",
                    EXPIRATION_DELAY_ENV,
                    ms
                );
                self.expiration_delay_ms = ms;
            }
            Err(_) => {
                tracing::debug!(
                    "ignoring invalid {} value {:?}, using {}ms",
                    EXPIRATION_DELAY_ENV,
                    raw,
                    self.expiration_delay_ms
                );
            }
        }
        self
    }

    /// Expiration delay as a duration
    pub fn expiration_delay(&self) -> Duration {
        Duration::from_millis(self.expiration_delay_ms)
    }

    fn validate(&self) -> SchedulerResult<()> {
        if self.worker_name.trim().is_empty() {
            return Err(SchedulerError::Config("worker_name must not be empty".into()));
        }
        Ok(())
    }
}

/// Global configuration handed to the context factory.
///
/// The scheduler does not interpret these values; they describe the
/// environment the analyzers run in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Working directory for analyzer temporary files
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    /// Process id of the client, used by analyzers that watch their parent
    #[serde(default)]
    pub client_pid: Option<u32>,
    /// Languages analyzers should be enabled for
    #[serde(default)]
    pub enabled_languages: BTreeSet<String>,
    /// Properties passed verbatim to every analyzer
    #[serde(default)]
    pub extra_properties: BTreeMap<String, String>,
}

impl EngineConfig {
    /// Parse a JSON document
    pub fn from_json(json: &str) -> SchedulerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> SchedulerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
