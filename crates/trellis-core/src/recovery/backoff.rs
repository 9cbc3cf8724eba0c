//! Delays between transport retries
//!
//! The HTTP client sleeps between transport-level retries using these delays.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{TrellisError, TrellisResult};

/// `[rotation.endpoints.client.backoff]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Maximum delay between retries
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Randomize each delay by up to `jitter_ratio`
    pub jitter: bool,
    /// Maximum jitter ratio (0.0 - 1.0)
    pub jitter_ratio: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: false,
            jitter_ratio: 0.2,
        }
    }
}

impl BackoffConfig {
    pub fn with_initial_delay(initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            ..Default::default()
        }
    }

    /// Set the maximum delay
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the multiplier
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Millisecond delays for tests and local tooling
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: false,
            jitter_ratio: 0.0,
        }
    }

    pub fn validate(&self) -> TrellisResult<()> {
        let invalid = |message: String| Err(TrellisError::config_with_context(message, "backoff"));
        if self.multiplier < 1.0 || !self.multiplier.is_finite() {
            return invalid(format!("backoff multiplier must be >= 1, got {}", self.multiplier));
        }
        if self.max_delay < self.initial_delay {
            return invalid("backoff max_delay must not be shorter than initial_delay".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return invalid(format!("jitter_ratio must be in [0, 1], got {}", self.jitter_ratio));
        }
        Ok(())
    }
}

/// Source of retry delays
pub trait BackoffStrategy: Send + Sync {
    /// Delay before retry number `attempt`, counting from 0
    fn delay_for_attempt(&self, attempt: u32) -> Duration;

    /// Reset the backoff state
    fn reset(&mut self);
}

/// Exponential backoff clamped to `[initial_delay, max_delay]`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    /// 4s, 8s, then 10s for every later retry
    pub fn new() -> Self {
        Self::with_config(BackoffConfig::default())
    }

    pub fn with_config(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Get the next delay and advance the attempt counter
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_for_attempt(self.attempt);
        self.attempt += 1;
        delay
    }

    /// Number of delays handed out since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    fn add_jitter(&self, delay: Duration) -> Duration {
        if !self.config.jitter || self.config.jitter_ratio <= 0.0 {
            return delay;
        }

        let range = delay.as_secs_f64() * self.config.jitter_ratio;
        let offset = rand::thread_rng().gen_range(-range..=range);
        Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.0))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.config.initial_delay.as_secs_f64()
            * self.config.multiplier.powi(attempt.min(32) as i32);
        let capped = base
            .min(self.config.max_delay.as_secs_f64())
            .max(self.config.initial_delay.as_secs_f64());

        self.add_jitter(Duration::from_secs_f64(capped))
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}
