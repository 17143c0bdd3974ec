//! Retry loop guarded by a circuit breaker.

use std::future::Future;
use std::sync::Arc;

use menuscout_core::RetrySettings;

use crate::circuit_breaker::{BreakerConfig, BreakerStatus, CircuitBreaker};
use crate::error::{DbError, ErrorClass};
use crate::retry::{RetryConfig, RetryConfigError};

/// Retry policy plus breaker settings for one guarded resource.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub breaker: BreakerConfig,
}

impl ResilienceConfig {
    /// Defaults for connection acquisition.
    #[must_use]
    pub fn connection() -> Self {
        Self {
            retry: RetryConfig::connection(),
            breaker: BreakerConfig::default(),
        }
    }

    /// Defaults for query and batch execution.
    #[must_use]
    pub fn operation() -> Self {
        Self {
            retry: RetryConfig::operation(),
            breaker: BreakerConfig {
                failure_threshold: 10,
                reset_timeout: std::time::Duration::from_secs(120),
                success_threshold: 2,
            },
        }
    }

    /// # Errors
    ///
    /// Returns [`RetryConfigError`] when any setting is out of bounds.
    pub fn from_settings(settings: &RetrySettings) -> Result<Self, RetryConfigError> {
        Ok(Self {
            retry: RetryConfig::from_settings(settings)?,
            breaker: BreakerConfig::from_settings(settings)?,
        })
    }
}

/// Runs fallible database operations under a [`RetryConfig`] and, when bound,
/// a shared [`CircuitBreaker`].
///
/// The breaker sees one outcome per [`run`](Self::run) call, not one per
/// attempt: intermediate temporary failures are absorbed by the retry loop.
#[derive(Debug, Clone)]
pub struct ResilientExecutor {
    resource: String,
    policy: RetryConfig,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl ResilientExecutor {
    #[must_use]
    pub fn new(resource: impl Into<String>, policy: RetryConfig, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            resource: resource.into(),
            policy,
            breaker: Some(breaker),
        }
    }

    /// Executor with its own breaker built from `config`.
    #[must_use]
    pub fn guarded(resource: &str, config: ResilienceConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(resource, config.breaker));
        Self::new(resource, config.retry, breaker)
    }

    /// Executor that retries but never trips.
    #[must_use]
    pub fn unguarded(resource: impl Into<String>, policy: RetryConfig) -> Self {
        Self {
            resource: resource.into(),
            policy,
            breaker: None,
        }
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    #[must_use]
    pub fn breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    #[must_use]
    pub fn breaker_status(&self) -> Option<BreakerStatus> {
        self.breaker.as_ref().map(|b| b.status())
    }

    /// Fails with [`DbError::CircuitOpen`] while the breaker would reject calls.
    ///
    /// Read-only: an open breaker past its timeout is reported as ready but is
    /// only moved to half-open by the next real call.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::CircuitOpen`] if the breaker is open.
    pub fn check_ready(&self) -> Result<(), DbError> {
        match &self.breaker {
            Some(b) if b.is_open() => Err(self.circuit_open()),
            _ => Ok(()),
        }
    }

    fn circuit_open(&self) -> DbError {
        DbError::CircuitOpen {
            resource: self.resource.clone(),
        }
    }

    /// Run `op` until it succeeds, fails permanently, or exhausts the policy.
    ///
    /// # Errors
    ///
    /// - [`DbError::CircuitOpen`] if the breaker rejects the call; `op` is not invoked.
    /// - The original error, unchanged, if it classifies as permanent.
    /// - [`DbError::RetriesExhausted`] wrapping the last temporary error.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, DbError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DbError>>,
    {
        if let Some(breaker) = &self.breaker {
            if !breaker.can_execute() {
                tracing::debug!(resource = %self.resource, operation, "circuit open; failing fast");
                return Err(self.circuit_open());
            }
        }

        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => {
                    if let Some(breaker) = &self.breaker {
                        breaker.record_success();
                    }
                    if attempt > 1 {
                        tracing::info!(resource = %self.resource, operation, attempt, "recovered after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.class() == ErrorClass::Permanent => {
                    if let Some(breaker) = &self.breaker {
                        breaker.record_failure();
                    }
                    tracing::error!(
                        resource = %self.resource,
                        operation,
                        attempt,
                        error = %err,
                        "permanent database error; not retrying"
                    );
                    return Err(err);
                }
                Err(err) if attempt >= max_attempts => {
                    if let Some(breaker) = &self.breaker {
                        breaker.record_failure();
                    }
                    tracing::error!(
                        resource = %self.resource,
                        operation,
                        attempts = attempt,
                        error = %err,
                        "retries exhausted"
                    );
                    return Err(DbError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    let delay = self.policy.compute_delay(attempt);
                    tracing::warn!(
                        resource = %self.resource,
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "temporary database error; retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod tests;
