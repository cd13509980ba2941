//! Retry and rate limiting policies for mutating Gateway calls
//!
//! Both policies are explicit objects built once per [`crate::GatewayClient`]
//! and composed around every mutation as `RateLimited(Retried(call))`:
//! the limiter gates entry to the retry loop, not each retry attempt.
//!
//! ## Failure classes
//!
//! | Class                | Budget      | Backoff                          |
//! |----------------------|-------------|----------------------------------|
//! | Throttled (HTTP 429) | unbounded   | `base * 2^(n-1)`, capped at 30s  |
//! | Anything else        | 5 attempts  | `base * 2^(n-1)`, capped at 10s, plus `U[0,1)s` jitter |
//!
//! `n` is the attempt number across both classes, so throttled attempts
//! count toward the 5 attempts an ordinary failure is allowed.
//!
//! Read-only calls are never wrapped; their errors go straight to the caller.

use crate::config::{RateLimitConfig, RetryConfig};
use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Retry policy for a single mutating operation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    throttled_max_delay: Duration,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Build a policy from configuration
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            throttled_max_delay: config.throttled_max_delay(),
            jitter: config.jitter,
        }
    }

    /// Attempt number at which a non-throttled failure is final
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Deterministic part of the wait before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32, throttled: bool) -> Duration {
        let cap = if throttled {
            self.throttled_max_delay
        } else {
            self.max_delay
        };
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent).min(cap)
    }

    fn jitter(&self) -> Duration {
        if self.jitter {
            Duration::from_secs_f64(rand::random::<f64>())
        } else {
            Duration::ZERO
        }
    }

    /// Run `op` until it succeeds, exhausts its budget, or forever while throttled
    ///
    /// `op` is called once per attempt and must perform exactly one remote call.
    /// Throttled failures never end the loop, but they do count as attempts:
    /// an ordinary failure on attempt `max_attempts` or later is final.
    ///
    /// # Returns
    ///
    /// - `Ok(T)`: The first successful result
    /// - `Err(Error::RetriesExhausted)`: The last ordinary failure once
    ///   an ordinary failure on attempt `max_attempts` or later
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);

            let err = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let wait = if err.is_rate_limited() {
                self.backoff(attempt, true)
            } else {
                if attempt >= self.max_attempts {
                    error!(operation, attempt, error = %err, "Retry budget exhausted");
                    return Err(Error::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        last_error: Box::new(err),
                    });
                }
                self.backoff(attempt, false) + self.jitter()
            };

            warn!(
                operation,
                attempt,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "Attempt failed, sleeping before retry"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

/// Process-wide spacing between mutating calls
///
/// One limiter is shared by every mutation issued through a client, so
/// calls against different resources are spaced too.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_completed: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter enforcing `min_interval` between completions and starts
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_completed: Mutex::new(None),
        }
    }

    /// Build a limiter from configuration
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.min_interval())
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Run `op` no sooner than `min_interval` after the previous one completed
    pub async fn run<T, F, Fut>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut last_completed = self.last_completed.lock().await;

        if let Some(previous) = *last_completed {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "Rate limiting mutating call");
                tokio::time::sleep(wait).await;
            }
        }

        let output = op().await;
        *last_completed = Some(Instant::now());
        output
    }
}
