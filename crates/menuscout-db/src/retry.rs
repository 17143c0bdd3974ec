//! Exponential backoff policy with optional jitter.

use std::time::Duration;

use menuscout_core::RetrySettings;
use rand::Rng;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetryConfigError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("base_delay must be greater than zero")]
    ZeroBaseDelay,
    #[error("max_delay ({max:?}) must be at least base_delay ({base:?})")]
    MaxBelowBase { base: Duration, max: Duration },
    #[error("backoff_factor must be greater than 1, got {0}")]
    FactorTooSmall(f64),
    #[error("jitter_factor must be in [0, 1), got {0}")]
    JitterOutOfRange(f64),
    #[error("breaker {0} must be at least 1")]
    ZeroThreshold(&'static str),
}

/// Immutable retry policy.
///
/// Construct with [`RetryConfig::new`] (validated) or one of the presets;
/// fields are read through accessors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
    jitter: bool,
    jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            jitter: true,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// # Errors
    ///
    /// Returns [`RetryConfigError`] when any bound is violated.
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_factor: f64,
        jitter: bool,
        jitter_factor: f64,
    ) -> Result<Self, RetryConfigError> {
        if max_attempts == 0 {
            return Err(RetryConfigError::ZeroAttempts);
        }
        if base_delay.is_zero() {
            return Err(RetryConfigError::ZeroBaseDelay);
        }
        if max_delay < base_delay {
            return Err(RetryConfigError::MaxBelowBase {
                base: base_delay,
                max: max_delay,
            });
        }
        if backoff_factor.is_nan() || backoff_factor <= 1.0 {
            return Err(RetryConfigError::FactorTooSmall(backoff_factor));
        }
        if !(0.0..1.0).contains(&jitter_factor) {
            return Err(RetryConfigError::JitterOutOfRange(jitter_factor));
        }
        Ok(Self {
            max_attempts,
            base_delay,
            max_delay,
            backoff_factor,
            jitter,
            jitter_factor,
        })
    }

    /// Policy for connection acquisition: many quick attempts.
    #[must_use]
    pub fn connection() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// Policy for queries and batches: few, widely spaced attempts.
    #[must_use]
    pub fn operation() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// Build from env-derived settings, keeping the default factor and jitter.
    ///
    /// # Errors
    ///
    /// Returns [`RetryConfigError`] when the settings are out of bounds.
    pub fn from_settings(settings: &RetrySettings) -> Result<Self, RetryConfigError> {
        let defaults = Self::default();
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.base_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
            defaults.backoff_factor,
            defaults.jitter,
            defaults.jitter_factor,
        )
    }

    /// Same policy with jitter switched on or off.
    #[must_use]
    pub fn with_jitter(self, jitter: bool) -> Self {
        Self { jitter, ..self }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay to sleep after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        self.compute_delay_with(attempt, &mut rand::rng())
    }

    /// [`compute_delay`](Self::compute_delay) with a caller-supplied RNG.
    ///
    /// `min(base * factor^(attempt-1), max)`, then shifted by up to
    /// `±jitter_factor` of itself when jitter is on. Never negative.
    pub fn compute_delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let exponent = i32::try_from(attempt.max(1) - 1).unwrap_or(i32::MAX);
        let raw = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let mut delay = raw.min(self.max_delay.as_secs_f64());

        if self.jitter && self.jitter_factor > 0.0 {
            let spread = delay * self.jitter_factor;
            delay += rng.random_range(-spread..=spread);
        }

        Duration::try_from_secs_f64(delay.max(0.0)).unwrap_or(self.max_delay)
    }
}
