//! Runner and worker configuration.
//!
//! Values come from `Default`, the `with_*` builders, or `CARDLINK_*` environment
//! variables via `from_env`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

/// Orchestrated runner retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// In-process retries after the first batch (total batches = max_retries + 1).
    pub max_retries: u32,
    /// Delay before the first retry; doubled after every retry.
    pub initial_latency: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_latency: Duration::from_secs(1),
        }
    }
}

impl RunnerConfig {
    pub const MAX_RETRIES_ENV: &'static str = "CARDLINK_RUNNER_MAX_RETRIES";
    pub const INITIAL_LATENCY_MS_ENV: &'static str = "CARDLINK_RUNNER_INITIAL_LATENCY_MS";

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_latency(mut self, latency: Duration) -> Self {
        self.initial_latency = latency;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(v) = parse(&lookup, Self::MAX_RETRIES_ENV)? {
            config.max_retries = v;
        }
        if let Some(ms) = parse(&lookup, Self::INITIAL_LATENCY_MS_ENV)? {
            config.initial_latency = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

/// Job worker polling and concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Name for logging
    pub name: String,
    /// Maximum concurrently running jobs
    pub max_concurrent: usize,
    /// Sleep between polls when the queue is empty
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "job-worker".to_string(),
            max_concurrent: 4,
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl WorkerConfig {
    pub const NAME_ENV: &'static str = "CARDLINK_WORKER_NAME";
    pub const MAX_CONCURRENT_ENV: &'static str = "CARDLINK_WORKER_MAX_CONCURRENT";
    pub const POLL_INTERVAL_MS_ENV: &'static str = "CARDLINK_WORKER_POLL_INTERVAL_MS";

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(name) = lookup(Self::NAME_ENV).filter(|n| !n.trim().is_empty()) {
            config.name = name;
        }
        if let Some(max) = parse::<usize>(&lookup, Self::MAX_CONCURRENT_ENV)? {
            if max == 0 {
                return Err(ConfigError::InvalidValue {
                    key: Self::MAX_CONCURRENT_ENV.to_string(),
                    value: "0".to_string(),
                });
            }
            config.max_concurrent = max;
        }
        if let Some(ms) = parse(&lookup, Self::POLL_INTERVAL_MS_ENV)? {
            config.poll_interval = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
    }
}
