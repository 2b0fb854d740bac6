//! Exponential-backoff retry decisions.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::FailureKind;

/// Outcome of consulting the policy after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Schedule another attempt after the given delay.
    Retry { after: Duration },
    /// Stop; the reason feeds the terminal rejection.
    GiveUp { reason: String },
}

/// The single retry policy shared by the generate and repair loops.
///
/// Consulted with the 0-based index of the attempt that just failed:
/// `Retry` while `attempt_index + 1 < max_attempts` and the failure kind is
/// retriable, `GiveUp` otherwise. The delay grows as
/// `base_delay × backoff_multiplier^attempt_index`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_secs_f64(config.base_delay_seconds.max(0.0)),
            backoff_multiplier: config.backoff_multiplier,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide what follows the failed attempt at `attempt_index`.
    pub fn decide(&self, attempt_index: u32, kind: FailureKind) -> RetryDecision {
        if !kind.is_retriable() {
            return RetryDecision::GiveUp {
                reason: format!("{kind} is not retriable"),
            };
        }
        if attempt_index + 1 >= self.max_attempts {
            return RetryDecision::GiveUp {
                reason: format!(
                    "gave up after {} of {} attempts",
                    attempt_index + 1,
                    self.max_attempts
                ),
            };
        }
        RetryDecision::Retry {
            after: self.delay_for(attempt_index),
        }
    }

    /// Backoff delay for the attempt at `attempt_index`.
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt_index as i32);
        Duration::from_secs_f64(self.base_delay.as_secs_f64() * factor)
    }
}
