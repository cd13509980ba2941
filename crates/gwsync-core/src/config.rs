//! Configuration types for gwsync
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Maximum number of items the Gateway accepts in a single list
pub const MAX_LIST_SIZE: usize = 1000;

/// Main gwsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Gateway API credentials
    pub gateway: GatewayConfig,

    /// CI pipeline context (None when not running inside the pipeline)
    #[serde(default)]
    pub pipeline: Option<PipelineConfig>,

    /// Durable cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// What to reconcile
    pub reconcile: ReconcileConfig,

    /// Retry policy for mutating calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Spacing between mutating calls
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl SyncConfig {
    /// Create a configuration with defaults for everything but credentials and prefix
    pub fn new(gateway: GatewayConfig, prefix: impl Into<String>) -> Self {
        Self {
            gateway,
            pipeline: None,
            cache: CacheConfig::default(),
            reconcile: ReconcileConfig::new(prefix),
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.gateway.validate()?;
        if let Some(pipeline) = &self.pipeline {
            pipeline.validate()?;
        }
        self.cache.validate()?;
        self.reconcile.validate()?;
        self.retry.validate()?;
        Ok(())
    }
}

/// Gateway API configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// API token with Zero Trust edit permissions
    pub api_token: String,

    /// Account identifier owning the lists and rules
    pub account_id: String,

    /// Log mutations instead of issuing them
    #[serde(default)]
    pub dry_run: bool,
}

// The API token must never show up in logs.
impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_token", &"<REDACTED>")
            .field("account_id", &self.account_id)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl GatewayConfig {
    /// Create a live gateway configuration
    pub fn new(api_token: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            account_id: account_id.into(),
            dry_run: false,
        }
    }

    /// Validate the gateway configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.api_token.is_empty() {
            return Err(crate::Error::config("Gateway API token cannot be empty"));
        }
        if self.account_id.is_empty() {
            return Err(crate::Error::config("Gateway account identifier cannot be empty"));
        }
        Ok(())
    }
}

/// CI pipeline configuration, used to decide whether the cache is trustworthy
#[derive(Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Repository in `owner/name` form
    pub repository: String,

    /// Token allowed to read and delete workflow runs and caches
    pub token: String,

    /// How many recent runs to inspect for a completed one
    #[serde(default = "default_runs_to_inspect")]
    pub runs_to_inspect: u32,
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("repository", &self.repository)
            .field("token", &"<REDACTED>")
            .field("runs_to_inspect", &self.runs_to_inspect)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a pipeline configuration
    pub fn new(repository: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            token: token.into(),
            runs_to_inspect: default_runs_to_inspect(),
        }
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.token.is_empty() {
            return Err(crate::Error::config("Pipeline token cannot be empty"));
        }
        match self.repository.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {}
            _ => {
                return Err(crate::Error::config(format!(
                    "Pipeline repository must be in owner/name form, got '{}'",
                    self.repository
                )));
            }
        }
        if self.runs_to_inspect == 0 || self.runs_to_inspect > 100 {
            return Err(crate::Error::config(
                "Pipeline runs_to_inspect must be between 1 and 100",
            ));
        }
        Ok(())
    }
}

/// Durable cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path to the snapshot file
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
        }
    }
}

impl CacheConfig {
    /// Validate the cache configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.path.as_os_str().is_empty() {
            return Err(crate::Error::config("Cache path cannot be empty"));
        }
        Ok(())
    }
}

/// Reconciliation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Name prefix identifying the lists and rules this tool owns
    pub prefix: String,

    /// Domains per list
    #[serde(default = "default_max_list_size")]
    pub max_list_size: usize,
}

impl ReconcileConfig {
    /// Create reconciliation settings with the default list size
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            max_list_size: default_max_list_size(),
        }
    }

    /// Set the list size
    pub fn with_max_list_size(mut self, max_list_size: usize) -> Self {
        self.max_list_size = max_list_size;
        self
    }

    /// Validate the reconciliation settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.prefix.trim().is_empty() {
            return Err(crate::Error::config("Name prefix cannot be empty"));
        }
        if self.max_list_size == 0 || self.max_list_size > MAX_LIST_SIZE {
            return Err(crate::Error::config(format!(
                "max_list_size must be between 1 and {}, got {}",
                MAX_LIST_SIZE, self.max_list_size
            )));
        }
        Ok(())
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts for ordinary failures (throttling is retried forever)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay (in milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff cap for ordinary failures (in milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff cap for throttled failures (in milliseconds)
    #[serde(default = "default_throttled_max_delay_ms")]
    pub throttled_max_delay_ms: u64,

    /// Add up to one second of random jitter to ordinary backoff
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            throttled_max_delay_ms: default_throttled_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    /// Validate the retry configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_attempts == 0 {
            return Err(crate::Error::config("Retry max_attempts must be > 0"));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(crate::Error::config(
                "Retry base_delay_ms cannot exceed max_delay_ms",
            ));
        }
        Ok(())
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn throttled_max_delay(&self) -> Duration {
        Duration::from_millis(self.throttled_max_delay_ms)
    }
}

/// Rate limiting configuration for mutating calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum spacing between two mutating calls (in milliseconds)
    ///
    /// Set to 0 to disable rate limiting.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

impl RateLimitConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

fn default_runs_to_inspect() -> u32 {
    5
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("cache.json")
}

fn default_max_list_size() -> usize {
    MAX_LIST_SIZE
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_throttled_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> bool {
    true
}

fn default_min_interval_ms() -> u64 {
    1_000
}
