//! Task record: metadata + envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskState;
use crate::domain::{LeaseId, TaskEnvelope, TaskId};

/// A time-bounded exclusive claim on one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub lease_id: LeaseId,
    pub task_id: TaskId,
    pub worker: String,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Metadata + envelope for a task in the queue.
///
/// Design:
/// - This is the "single source of truth" for task state, and the unit the
///   journal persists.
/// - The pending index holds `(not_before, seq, TaskId)` only.
/// - All state transitions happen here; the table decides which are legal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub envelope: TaskEnvelope,
    pub state: TaskState,

    /// Enqueue order, used as the FIFO tie-break between equal `not_before`.
    pub seq: u64,

    /// Never run before this instant.
    pub not_before: DateTime<Utc>,

    /// Number of claims so far (including the current one if Running).
    pub attempts: u32,
    pub max_attempts: u32,

    pub last_error: Option<String>,

    /// Present only while Running.
    pub lease: Option<Lease>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(
        envelope: TaskEnvelope,
        not_before: DateTime<Utc>,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            envelope,
            state: TaskState::Pending,
            seq: 0,
            not_before,
            attempts: 0,
            max_attempts,
            last_error: None,
            lease: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.envelope.task_id()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state.is_runnable() && self.not_before <= now
    }

    /// Does `lease_id` still own this task?
    pub fn is_held_by(&self, lease_id: LeaseId) -> bool {
        self.state == TaskState::Running
            && self.lease.as_ref().is_some_and(|l| l.lease_id == lease_id)
    }

    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == TaskState::Running && self.lease.as_ref().is_none_or(|l| l.is_expired(now))
    }

    /// Pending -> Running (increment attempts).
    pub fn claim(&mut self, lease: Lease, now: DateTime<Utc>) {
        self.state = TaskState::Running;
        self.attempts += 1;
        self.lease = Some(lease);
        self.updated_at = now;
    }

    /// Push the lease deadline forward.
    pub fn renew(&mut self, expires_at: DateTime<Utc>, now: DateTime<Utc>) {
        if let Some(lease) = self.lease.as_mut() {
            lease.expires_at = expires_at;
        }
        self.updated_at = now;
    }

    pub fn mark_done(&mut self, now: DateTime<Utc>) {
        self.state = TaskState::Done;
        self.lease = None;
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, error: String, now: DateTime<Utc>) {
        self.state = TaskState::Failed;
        self.lease = None;
        self.last_error = Some(error);
        self.updated_at = now;
    }

    /// Running -> Pending with backoff.
    pub fn schedule_retry(&mut self, not_before: DateTime<Utc>, error: String, now: DateTime<Utc>) {
        self.state = TaskState::Pending;
        self.lease = None;
        self.not_before = not_before;
        self.last_error = Some(error);
        self.updated_at = now;
    }

    /// Running -> Pending after the lease ran out. `not_before` is kept, so the
    /// task regains its original place in line.
    pub fn release_expired(&mut self, now: DateTime<Utc>) {
        self.state = TaskState::Pending;
        self.lease = None;
        self.updated_at = now;
    }
}
