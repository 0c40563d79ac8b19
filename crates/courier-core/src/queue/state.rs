//! Task state machine for the queue.

use serde::{Deserialize, Serialize};

/// Task state.
///
/// State transitions:
/// - Pending -> Running -> Done
/// - Pending -> Running -> Pending (retriable failure, with backoff)
/// - Pending -> Running -> Pending (lease expired, worker presumed dead)
/// - Pending -> Running -> Failed (permanent failure or attempts exhausted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for `not_before` and a free worker.
    Pending,

    /// Claimed by a worker holding a live lease.
    Running,

    /// Handler succeeded.
    Done,

    /// Gave up. Never retried.
    Failed,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }

    /// Is this task eligible for a claim once it is due?
    pub fn is_runnable(self) -> bool {
        matches!(self, TaskState::Pending)
    }
}
