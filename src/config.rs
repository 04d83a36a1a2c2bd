use crate::error::NetdocError;
use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
    time::Duration,
};

/// Geometric endpoint repair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    /// Search radius as a multiple of the median shape size on the page
    pub radius_factor: f64,
}

impl Default for HealingConfig {
    fn default() -> Self {
        HealingConfig { radius_factor: 1.5 }
    }
}

/// Bounded exponential backoff for transient storage failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 4,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based): `initial * 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Length of the most-connected device list
    pub top_n: usize,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        TopologyConfig { top_n: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub count: usize,
    pub poll_interval_ms: u64,
    /// Stop a worker once the queue reports no pending message
    pub exit_when_idle: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            count: 2,
            poll_interval_ms: 500,
            exit_when_idle: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Fill in hostname/description/bandwidth defaults for missing properties
    pub enrich_defaults: bool,
    /// Replacement device keyword table (TOML); the embedded table is used when unset
    pub device_rules: Option<PathBuf>,
    /// Replacement connection keyword table (TOML)
    pub connection_rules: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetdocConfig {
    pub healing: HealingConfig,
    pub retry: RetryConfig,
    pub topology: TopologyConfig,
    pub worker: WorkerConfig,
    pub extraction: ExtractionConfig,
}

impl NetdocConfig {
    pub fn validate(&self) -> Result<(), NetdocError> {
        if !self.healing.radius_factor.is_finite() || self.healing.radius_factor < 0.0 {
            return Err(NetdocError::Config(format!(
                "healing.radius_factor must be a non-negative number, got {}",
                self.healing.radius_factor
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(NetdocError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.worker.count == 0 {
            return Err(NetdocError::Config(
                "worker.count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub trait ConfigProvider: Send + Sync {
    fn load(&self) -> Result<NetdocConfig, NetdocError>;
    fn store(&self, config: &NetdocConfig) -> Result<(), NetdocError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn load(&self) -> Result<NetdocConfig, NetdocError> {
        tracing::debug!("Attempting to read config from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(NetdocConfig::default());
        }
        let content = read_to_string(&self.path)?;
        let config: NetdocConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn store(&self, config: &NetdocConfig) -> Result<(), NetdocError> {
        tracing::debug!("Attempting to write config to: {:?}", &self.path);
        let toml_string = toml::to_string(config)?;
        write(&self.path, toml_string)?;
        Ok(())
    }
}
