//! # Backoff Calculator
//!
//! Exponential backoff for chunk retries: `base * multiplier^(retry - 1)`, capped at
//! the configured maximum, with optional symmetric jitter so that a burst of
//! throttled chunks does not retry in lockstep.

use rand::Rng;
use std::time::Duration;

use crate::config::BackoffConfig;

#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    config: BackoffConfig,
}

impl BackoffCalculator {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Delay before retry number `retry` (1-based) of a chunk
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.config.base_delay_ms as f64 * self.config.multiplier.powi(exponent);
        let capped = raw.min(self.config.max_delay_ms as f64).max(0.0) as u64;

        let delay_ms = if self.config.jitter_enabled {
            self.apply_jitter(capped)
        } else {
            capped
        };
        Duration::from_millis(delay_ms)
    }

    fn apply_jitter(&self, delay_ms: u64) -> u64 {
        let jitter_range = (delay_ms as f64 * self.config.max_jitter) as u64;
        if jitter_range == 0 {
            return delay_ms;
        }

        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(0..=jitter_range);
        if rng.gen_bool(0.5) {
            delay_ms
                .saturating_add(jitter)
                .min(self.config.max_delay_ms)
        } else {
            delay_ms.saturating_sub(jitter)
        }
    }
}

impl Default for BackoffCalculator {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
