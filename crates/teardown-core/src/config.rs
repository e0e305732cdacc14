//! Worker configuration.
//!
//! Every field has a default so partial documents deserialize; the CLI fills
//! the rest from flags and environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{REMOVE_TASK_TYPE, RetryPolicy};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("retry.max_attempts must be at least 1")]
    NoAttempts,

    #[error("retry.backoff_multiplier must be >= 1.0 (got {0})")]
    ShrinkingBackoff(f64),

    #[error("workers must be at least 1")]
    NoWorkers,

    #[error("missing {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_seconds: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_seconds: 2,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs(self.base_delay_seconds),
            self.backoff_multiplier,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Base URL of the cluster API, e.g. `https://console.example.com:8443`.
    pub console_url: String,
    pub token: String,
    pub timeout_seconds: u64,

    /// Post-delete `exists` polls; 0 disables confirmation.
    pub confirm_attempts: u32,
    pub confirm_interval_seconds: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            console_url: String::new(),
            token: String::new(),
            timeout_seconds: 30,
            confirm_attempts: 0,
            confirm_interval_seconds: 2,
        }
    }
}

impl ClusterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn confirm_interval(&self) -> Duration {
        Duration::from_secs(self.confirm_interval_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// GraphQL endpoint of the registry API.
    pub endpoint: String,
    pub token: String,
    pub timeout_seconds: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            token: String::new(),
            timeout_seconds: 30,
        }
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub queue: String,
    pub workers: usize,
    pub retry: RetryConfig,
    pub cluster: ClusterConfig,
    pub registry: RegistryConfig,
    pub log_format: LogFormat,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: REMOVE_TASK_TYPE.to_string(),
            workers: 1,
            retry: RetryConfig::default(),
            cluster: ClusterConfig::default(),
            registry: RegistryConfig::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl WorkerConfig {
    /// Fail fast on settings the worker cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if !(self.retry.backoff_multiplier >= 1.0) {
            return Err(ConfigError::ShrinkingBackoff(self.retry.backoff_multiplier));
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.cluster.console_url.trim().is_empty() {
            return Err(ConfigError::Missing("cluster.console_url"));
        }
        if self.registry.endpoint.trim().is_empty() {
            return Err(ConfigError::Missing("registry.endpoint"));
        }
        Ok(())
    }
}
