//! Consecutive-failure circuit breaker shared by every caller of one resource.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use menuscout_core::RetrySettings;
use tokio::time::Instant;

use crate::retry::RetryConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

impl BreakerConfig {
    /// # Errors
    ///
    /// Returns [`RetryConfigError::ZeroThreshold`] if either threshold is zero.
    pub fn new(
        failure_threshold: u32,
        reset_timeout: Duration,
        success_threshold: u32,
    ) -> Result<Self, RetryConfigError> {
        if failure_threshold == 0 {
            return Err(RetryConfigError::ZeroThreshold("failure_threshold"));
        }
        if success_threshold == 0 {
            return Err(RetryConfigError::ZeroThreshold("success_threshold"));
        }
        Ok(Self {
            failure_threshold,
            reset_timeout,
            success_threshold,
        })
    }

    /// # Errors
    ///
    /// Returns [`RetryConfigError::ZeroThreshold`] if either threshold is zero.
    pub fn from_settings(settings: &RetrySettings) -> Result<Self, RetryConfigError> {
        Self::new(
            settings.breaker_failure_threshold,
            Duration::from_secs(settings.breaker_reset_secs),
            settings.breaker_success_threshold,
        )
    }
}

/// Point-in-time view of a breaker, for status output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerStatus {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub success_count: u32,
    pub failure_threshold: u32,
    pub last_failure_age: Option<Duration>,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    // State stays consistent even if a holder panicked: every mutation is a
    // handful of field writes with no await in between.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reset_elapsed(&self, inner: &Inner) -> bool {
        inner
            .last_failure
            .is_none_or(|at| at.elapsed() >= self.config.reset_timeout)
    }

    /// Whether a guarded attempt may proceed.
    ///
    /// An open breaker whose reset timeout has elapsed moves to half-open
    /// under the same lock and admits the call.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                if self.reset_elapsed(&inner) {
                    inner.state = BreakerState::HalfOpen;
                    inner.success_count = 0;
                    tracing::info!(breaker = %self.name, "circuit breaker half-open; admitting trial calls");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// `true` while the breaker would reject a call. Does not transition.
    #[must_use]
    pub fn is_open(&self) -> bool {
        let inner = self.lock();
        inner.state == BreakerState::Open && !self.reset_elapsed(&inner)
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    tracing::info!(breaker = %self.name, "circuit breaker closed");
                }
            }
            BreakerState::Closed => inner.failure_count = 0,
            // A call admitted before the breaker opened finished late.
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.last_failure = Some(Instant::now());
        match inner.state {
            BreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        reset_secs = self.config.reset_timeout.as_secs(),
                        "circuit breaker opened"
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.success_count = 0;
                tracing::warn!(breaker = %self.name, "trial call failed; circuit breaker reopened");
            }
            BreakerState::Open => {}
        }
    }

    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    #[must_use]
    pub fn status(&self) -> BreakerStatus {
        let inner = self.lock();
        BreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            failure_threshold: self.config.failure_threshold,
            last_failure_age: inner.last_failure.map(|at| at.elapsed()),
        }
    }

    /// Force the breaker closed with zeroed counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_failure = None;
        tracing::info!(breaker = %self.name, "circuit breaker reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, reset_secs: u64, successes: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            BreakerConfig::new(threshold, Duration::from_secs(reset_secs), successes).unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn opens_at_threshold_and_rejects_until_timeout() {
        let cb = breaker(5, 60, 2);
        for _ in 0..4 {
            cb.record_failure();
            assert_eq!(cb.state(), BreakerState::Closed);
        }
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.can_execute());
        assert!(cb.is_open());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!cb.can_execute());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_after_timeout_then_closes_on_successes() {
        let cb = breaker(5, 60, 2);
        for _ in 0..5 {
            cb.record_failure();
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!cb.is_open(), "peek must report admissible after timeout");
        assert_eq!(cb.state(), BreakerState::Open, "peek must not transition");

        assert!(cb.can_execute());
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.status().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens_immediately() {
        let cb = breaker(5, 60, 3);
        for _ in 0..5 {
            cb.record_failure();
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cb.can_execute());
        cb.record_success();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn success_while_closed_resets_failure_count() {
        let cb = breaker(3, 60, 2);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.status().failure_count, 2);
    }

    #[test]
    fn reset_forces_closed() {
        let cb = breaker(1, 3_600, 2);
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        cb.reset();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.can_execute());
        assert_eq!(cb.status().last_failure_age, None);
    }

    #[test]
    fn zero_thresholds_are_rejected() {
        assert_eq!(
            BreakerConfig::new(0, Duration::from_secs(1), 1),
            Err(RetryConfigError::ZeroThreshold("failure_threshold"))
        );
        assert_eq!(
            BreakerConfig::new(1, Duration::from_secs(1), 0),
            Err(RetryConfigError::ZeroThreshold("success_threshold"))
        );
    }

    #[test]
    fn concurrent_failures_open_exactly_once() {
        let cb = std::sync::Arc::new(breaker(10, 60, 2));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let cb = std::sync::Arc::clone(&cb);
                std::thread::spawn(move || cb.record_failure())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let status = cb.status();
        assert_eq!(status.state, BreakerState::Open);
        assert_eq!(status.failure_count, 10);
    }
}
