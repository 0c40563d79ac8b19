//! Decision model: what happens to a task after its handler failed.

use chrono::TimeDelta;

use super::CourierError;
use crate::queue::{RetryPolicy, TaskRecord};

/// The next action to take for a failed task.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Back to pending after `delay`.
    Retry { delay: TimeDelta, reason: String },

    /// Give up.
    MarkFailed { reason: String },
}

/// Decides the fate of a failed attempt.
///
/// Deciders are pure: given the record (attempts already include the failed
/// one) and the error, they return the next action without side effects.
pub trait Decider: Send + Sync {
    fn decide(&self, task: &TaskRecord, error: &CourierError) -> Decision;
}

/// Attempt-based retry with exponential backoff:
/// - permanent errors are never retried
/// - retry while attempts < max_attempts
/// - mark failed once attempts >= max_attempts
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
    fn decide(&self, task: &TaskRecord, error: &CourierError) -> Decision {
        if !error.is_retriable() {
            return Decision::MarkFailed {
                reason: format!("Not retriable: {error}"),
            };
        }
        if task.attempts >= task.max_attempts {
            return Decision::MarkFailed {
                reason: format!(
                    "Max attempts reached: {}/{}: {error}",
                    task.attempts, task.max_attempts
                ),
            };
        }
        let delay = self.retry_policy.next_delay(task.attempts);
        Decision::Retry {
            delay,
            reason: format!(
                "Retry attempt {}/{} after {}ms: {error}",
                task.attempts + 1,
                task.max_attempts,
                delay.num_milliseconds()
            ),
        }
    }
}
