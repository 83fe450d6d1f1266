//! Retry policy and circuit breaker generalized from the teacher's
//! `api::client::retry::RetryPolicy`.
//!
//! The exponential-backoff math is unchanged; what's generalized is the
//! predicate — instead of inspecting an `ApiError`'s HTTP status, it asks
//! an [`crate::error::ErrorCode`] whether it's retryable at all.

use crate::config::RetryConfig;
use crate::error::FolioError;
use std::time::Duration;

/// Bounded exponential-backoff retry policy.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
        }
    }
}

impl RetryPolicy {
    /// Decide whether another attempt should be scheduled after `attempt`
    /// (0-indexed) failed with `err`.
    pub fn should_retry(&self, err: &FolioError, attempt: u32) -> bool {
        if attempt.saturating_add(1) >= self.max_attempts {
            return false;
        }
        err.code.is_retryable()
    }

    /// Compute the delay before the next attempt.
    pub fn retry_delay_for(&self, attempt: u32) -> Duration {
        let pow = 2u32.saturating_pow(attempt);
        let millis = self
            .initial_backoff
            .as_millis()
            .saturating_mul(pow as u128)
            .min(self.max_backoff.as_millis());
        Duration::from_millis(millis as u64)
    }
}

/// Run `operation` under `policy`, sleeping between retryable failures.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, FolioError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, FolioError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !policy.should_retry(&err, attempt) {
                    return Err(err);
                }
                tokio::time::sleep(policy.retry_delay_for(attempt)).await;
                attempt += 1;
            }
        }
    }
}

/// Circuit breaker state, generalized from the same retry-policy shape for
/// use around the render orchestrator: trips open after consecutive
/// failures, half-opens after a cooldown to probe recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<std::time::Instant>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }

    /// Whether a call is currently allowed to proceed. Transitions
    /// `Open` -> `HalfOpen` once the cooldown has elapsed.
    pub fn allow(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if self.opened_at.map(|t| t.elapsed() >= self.cooldown).unwrap_or(false) {
                    self.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.state == CircuitState::HalfOpen || self.consecutive_failures >= self.threshold {
            self.state = CircuitState::Open;
            self.opened_at = Some(std::time::Instant::now());
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == CircuitState::Open
    }

    /// Whether the next call is a post-cooldown recovery probe.
    pub fn is_half_open(&self) -> bool {
        self.state == CircuitState::HalfOpen
    }

    /// Milliseconds remaining until the next probe is allowed, if open.
    pub fn retry_after_ms(&self) -> u64 {
        match self.opened_at {
            Some(opened_at) => self
                .cooldown
                .saturating_sub(opened_at.elapsed())
                .as_millis() as u64,
            None => 0,
        }
    }
}
