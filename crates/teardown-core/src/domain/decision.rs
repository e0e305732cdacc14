//! Decision model: what the consumer does with a failed delivery.
//!
//! The Decider is pure: error kind + attempt count + policy in, Decision out.
//! Executing the decision (redelivery, dead-letter, events) is the worker
//! loop's job.

use std::time::Duration;

use super::errors::{ErrorKind, RemovalError};

/// Retry policy for failed removals.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total deliveries allowed, including the first one.
    pub max_attempts: u32,

    /// Delay before the first redelivery.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier,
        }
    }

    /// Calculate delay for the next retry based on attempt number.
    ///
    /// `attempts` is the number of deliveries already made (1-indexed).
    /// delay = base_delay * multiplier^(attempts - 1)
    ///
    /// Example with base_delay=2s, multiplier=2.0:
    /// - attempt 1 (first failure): 2s
    /// - attempt 2: 4s
    /// - attempt 3: 8s
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = base_secs * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

/// The next action for a failed delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Redeliver after `delay`. `attempt` is the attempt that just failed.
    Retry { attempt: u32, delay: Duration },

    /// Stop. Manual operator intervention is required.
    DeadLetter { attempts: u32, reason: String },
}

/// Trait for deciding the next action for a failed delivery.
pub trait Decider: Send + Sync {
    fn decide(&self, error: &RemovalError, attempts: u32) -> Decision;

    /// Delivery budget, reported in retry events.
    fn max_attempts(&self) -> u32;
}

/// Default decider:
/// - permanent errors dead-letter immediately (no retry budget consumed)
/// - transient errors retry while attempts < max_attempts
/// - dead-letter on exhaustion
#[derive(Debug, Clone, Default)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }
}

impl Decider for DefaultDecider {
    fn max_attempts(&self) -> u32 {
        self.retry_policy.max_attempts
    }

    fn decide(&self, error: &RemovalError, attempts: u32) -> Decision {
        match error.kind() {
            ErrorKind::Permanent => Decision::DeadLetter {
                attempts,
                reason: format!("non-retriable: {error}"),
            },
            ErrorKind::Transient if attempts < self.retry_policy.max_attempts => {
                Decision::Retry {
                    attempt: attempts,
                    delay: self.retry_policy.next_delay(attempts),
                }
            }
            ErrorKind::Transient => Decision::DeadLetter {
                attempts,
                reason: format!(
                    "max attempts reached: {}/{}: {error}",
                    attempts, self.retry_policy.max_attempts
                ),
            },
        }
    }
}
