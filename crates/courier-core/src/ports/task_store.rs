//! TaskStore port - the source of truth for queued tasks.
//!
//! 設計原則:
//! - 状態遷移（claim / complete / retry / fail / reap）はストア内で原子的に行う
//! - Lease の権威はここにある。期限切れの lease は claim の中で回収される
//! - 書き込みは呼び出し元に戻る前に永続化されている

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use crate::app::status::QueueCounts;
use crate::domain::{CourierError, LeaseId, TaskId};
use crate::queue::{Lease, TaskRecord};

/// Parameters of one claim attempt.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub now: DateTime<Utc>,
    pub worker: String,
    pub lease_id: LeaseId,
    pub lease_ttl: TimeDelta,
}

/// A task handed to exactly one worker.
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub lease: Lease,
    /// Snapshot taken right after the claim (state Running).
    pub record: TaskRecord,
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Durably store a new Pending record. The store assigns `seq`.
    async fn insert(&self, record: TaskRecord) -> Result<TaskRecord, CourierError>;

    /// Return expired leases to Pending, then claim the due task with the
    /// smallest `(not_before, seq)`, all under one lock.
    async fn claim_next(&self, request: ClaimRequest) -> Result<Option<ClaimedTask>, CourierError>;

    /// Heartbeat. Fails with `LeaseLost` once the lease was reclaimed.
    async fn renew(
        &self,
        lease: &Lease,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), CourierError>;

    async fn complete(&self, lease: &Lease, now: DateTime<Utc>) -> Result<TaskRecord, CourierError>;

    async fn retry(
        &self,
        lease: &Lease,
        not_before: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<TaskRecord, CourierError>;

    async fn fail(
        &self,
        lease: &Lease,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<TaskRecord, CourierError>;

    async fn get(&self, task_id: TaskId) -> Result<Option<TaskRecord>, CourierError>;

    async fn counts(&self) -> Result<QueueCounts, CourierError>;

    /// Earliest `not_before` among pending tasks.
    async fn next_due_at(&self) -> Result<Option<DateTime<Utc>>, CourierError>;

    /// Drop Done/Failed records last updated before `cutoff`. Returns how many.
    async fn purge_terminal(&self, cutoff: DateTime<Utc>) -> Result<usize, CourierError>;
}
