//! Retry policy: backoff delay and retry eligibility
//!
//! A pure function of `(strategy, attempt_count)`. `attempt_count` is the
//! number of attempts made so far, i.e. the count *after* the attempt that
//! just failed, so it is 1 for the first failure.
//!
//! `max_attempts` bounds total attempts, including the first. With
//! `max_attempts = 0` the first attempt still happens (the counter reaches 1
//! before any check) and every failure stops immediately.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RetryStrategy {
    Fixed {
        delay_ms: u64,
        max_attempts: u32,
    },
    Exponential {
        base_ms: u64,
        max_ms: u64,
        max_attempts: u32,
    },
    /// No automatic retries; failed entries wait for an explicit re-arm
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    Stop,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        RetryStrategy::Exponential {
            base_ms: 1_000,
            max_ms: 30_000,
            max_attempts: 5,
        }
    }
}

impl RetryStrategy {
    /// Delay before the next automatic attempt, or `Stop`
    pub fn next_delay(&self, attempt_count: u32) -> RetryDecision {
        match *self {
            RetryStrategy::Fixed {
                delay_ms,
                max_attempts,
            } => {
                if attempt_count < max_attempts {
                    RetryDecision::RetryAfter(Duration::from_millis(delay_ms))
                } else {
                    RetryDecision::Stop
                }
            }
            RetryStrategy::Exponential {
                base_ms,
                max_ms,
                max_attempts,
            } => {
                if attempt_count < max_attempts {
                    RetryDecision::RetryAfter(Duration::from_millis(exponential_delay_ms(
                        base_ms,
                        max_ms,
                        attempt_count,
                    )))
                } else {
                    RetryDecision::Stop
                }
            }
            RetryStrategy::Manual => RetryDecision::Stop,
        }
    }

    /// Whether an entry with this many attempts may still be retried at all
    ///
    /// Manual entries are always eligible: re-arming is the caller's call.
    pub fn is_retry_eligible(&self, attempt_count: u32) -> bool {
        match *self {
            RetryStrategy::Fixed { max_attempts, .. }
            | RetryStrategy::Exponential { max_attempts, .. } => attempt_count < max_attempts,
            RetryStrategy::Manual => true,
        }
    }
}

/// `min(base * 2^(attempt-1), max)`, saturating instead of overflowing
fn exponential_delay_ms(base_ms: u64, max_ms: u64, attempt_count: u32) -> u64 {
    let exponent = attempt_count.saturating_sub(1);
    2u64.checked_pow(exponent)
        .and_then(|factor| base_ms.checked_mul(factor))
        .unwrap_or(u64::MAX)
        .min(max_ms)
}
