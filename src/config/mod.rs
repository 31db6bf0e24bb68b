//! # RenderFleet Configuration System
//!
//! Layered configuration for the orchestrator: built-in defaults, then
//! `config/renderfleet/base.toml`, then `config/renderfleet/{environment}.toml`,
//! then `RENDERFLEET__SECTION__FIELD` environment variables.
//!
//! Every section deserializes with defaults, so an empty source set yields a
//! working configuration. Loading always finishes with [`RenderFleetConfig::validate`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use renderfleet_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let max_in_flight = manager.config().dispatch.max_concurrency;
//! let invocation_timeout = manager.config().timeouts.invocation_timeout();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/renderfleet/*.toml`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderFleetConfig {
    /// Bounded-concurrency dispatch settings
    pub dispatch: DispatchConfig,

    /// Retry backoff schedule for transient worker failures
    pub backoff: BackoffConfig,

    /// Per-invocation and per-job deadlines
    pub timeouts: TimeoutConfig,

    /// Output merge settings
    pub stitch: StitchConfig,

    /// Bucket naming, retention and checkpointing
    pub storage: StorageConfig,

    /// What happens to partial output when a job is cancelled
    pub cancellation: CancellationConfig,

    /// Revision deployment bounds
    pub fleet: FleetConfig,

    /// Progress estimation settings
    pub progress: ProgressConfig,

    /// Cost estimation settings
    pub pricing: PricingConfig,

    /// Lifecycle event channel settings
    pub events: EventConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum in-flight worker invocations per job
    pub max_concurrency: usize,
    /// Retries allowed per chunk after the first attempt
    pub max_retries: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 100,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter_enabled: bool,
    /// Maximum jitter as a fraction of the delay (0.0 to 1.0)
    pub max_jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter_enabled: true,
            max_jitter: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub invocation_timeout_ms: u64,
    pub job_timeout_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            invocation_timeout_ms: 30_000,
            job_timeout_seconds: 600,
        }
    }
}

impl TimeoutConfig {
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StitchConfig {
    /// Whole-artifact attempts before the job fails with `StitchFailure`
    pub max_attempts: u32,
    /// Delay between whole-artifact attempts
    pub retry_delay_ms: u64,
    /// Concurrent chunk blob reads while merging
    pub fetch_concurrency: usize,
    /// Delete chunk blobs once the output is written
    pub cleanup_chunks: bool,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 500,
            fetch_concurrency: 8,
            cleanup_chunks: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket_prefix: String,
    pub default_region: String,
    /// Lifecycle expiry applied to every bucket
    pub retention_days: u32,
    /// Write `job/{id}/status.json` on every job status transition
    pub checkpoint_status: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket_prefix: "renderfleet".to_string(),
            default_region: "us-east-1".to_string(),
            retention_days: 30,
            checkpoint_status: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CancellationConfig {
    /// Remove segments and any output of a job that ends failed, cancelled
    /// or timed out
    pub delete_partial_output: bool,
}

impl Default for CancellationConfig {
    fn default() -> Self {
        Self {
            delete_partial_output: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FleetConfig {
    pub revision_prefix: String,
    pub min_memory_mb: u32,
    pub max_memory_mb: u32,
    pub max_timeout_seconds: u32,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            revision_prefix: "renderfleet-worker".to_string(),
            min_memory_mb: 512,
            max_memory_mb: 10_240,
            max_timeout_seconds: 900,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Completed chunks considered by the render-time moving average
    pub moving_average_window: usize,
    /// How long a finished job stays in memory before only its storage
    /// checkpoint answers for it
    pub retain_terminal_seconds: u64,
}

impl ProgressConfig {
    pub fn terminal_retention(&self) -> Duration {
        Duration::from_secs(self.retain_terminal_seconds)
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            moving_average_window: 20,
            retain_terminal_seconds: 3_600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Smallest billable duration; durations are rounded up to a multiple
    pub billing_unit_ms: u64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self { billing_unit_ms: 1 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventConfig {
    pub channel_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
        }
    }
}

impl RenderFleetConfig {
    /// Reject configurations the orchestrator cannot run with
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.dispatch.max_concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "dispatch.max_concurrency",
                0,
                "at least one invocation slot is required",
            ));
        }

        if self.backoff.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "backoff.multiplier",
                self.backoff.multiplier,
                "multiplier must be >= 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&self.backoff.max_jitter) {
            return Err(ConfigurationError::invalid_value(
                "backoff.max_jitter",
                self.backoff.max_jitter,
                "jitter must be between 0.0 and 1.0",
            ));
        }

        if self.backoff.base_delay_ms > self.backoff.max_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "backoff.base_delay_ms",
                self.backoff.base_delay_ms,
                "base delay cannot exceed backoff.max_delay_ms",
            ));
        }

        if self.timeouts.invocation_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "timeouts.invocation_timeout_ms",
                0,
                "invocation timeout must be greater than 0",
            ));
        }

        if self.timeouts.invocation_timeout() >= self.timeouts.job_timeout() {
            return Err(ConfigurationError::invalid_value(
                "timeouts.invocation_timeout_ms",
                self.timeouts.invocation_timeout_ms,
                "invocation timeout must be shorter than the job timeout",
            ));
        }

        if self.stitch.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "stitch.max_attempts",
                0,
                "at least one stitch attempt is required",
            ));
        }

        if self.stitch.fetch_concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "stitch.fetch_concurrency",
                0,
                "fetch concurrency must be greater than 0",
            ));
        }

        if self.storage.bucket_prefix.is_empty() {
            return Err(ConfigurationError::invalid_value(
                "storage.bucket_prefix",
                "",
                "bucket prefix cannot be empty",
            ));
        }

        if self.storage.retention_days == 0 {
            return Err(ConfigurationError::invalid_value(
                "storage.retention_days",
                0,
                "retention must be at least one day",
            ));
        }

        if self.fleet.min_memory_mb > self.fleet.max_memory_mb {
            return Err(ConfigurationError::invalid_value(
                "fleet.min_memory_mb",
                self.fleet.min_memory_mb,
                "minimum memory exceeds fleet.max_memory_mb",
            ));
        }

        if self.pricing.billing_unit_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "pricing.billing_unit_ms",
                0,
                "billing unit must be greater than 0",
            ));
        }

        if self.progress.moving_average_window == 0 {
            return Err(ConfigurationError::invalid_value(
                "progress.moving_average_window",
                0,
                "window must hold at least one sample",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RenderFleetConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatch.max_retries, 3);
        assert!(config.cancellation.delete_partial_output);
        assert_eq!(config.timeouts.invocation_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_invocation_timeout_must_be_shorter_than_job_timeout() {
        let mut config = RenderFleetConfig::default();
        config.timeouts.invocation_timeout_ms = 700_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeouts.invocation_timeout_ms"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = RenderFleetConfig::default();
        config.dispatch.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: RenderFleetConfig = serde_json::from_value(serde_json::json!({
            "dispatch": { "max_retries": 5 }
        }))
        .unwrap();
        assert_eq!(config.dispatch.max_retries, 5);
        assert_eq!(config.dispatch.max_concurrency, 100);
        assert_eq!(config.stitch.max_attempts, 3);
    }
}
