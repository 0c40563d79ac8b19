//! LocalTaskStore - 単一プロセス用の TaskStore
//!
//! - in_memory(): テスト・デモ用（再起動で消える）
//! - open(path): JSON-lines journal に永続化。開いたプロセスがファイルを専有する前提
//!
//! すべての状態遷移は 1 つの Mutex の中で
//! 「次の record を計算 → journal に書く → table に反映」の順で行う。

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::journal::{FileJournal, JournalEntry};
use crate::app::status::QueueCounts;
use crate::domain::{CourierError, TaskId};
use crate::ports::{ClaimRequest, ClaimedTask, TaskStore};
use crate::queue::{Lease, TaskRecord, TaskTable};

struct Inner {
    table: TaskTable,
    journal: Option<FileJournal<TaskId, TaskRecord>>,
}

impl Inner {
    async fn commit(&mut self, records: Vec<TaskRecord>) -> Result<(), CourierError> {
        if let Some(journal) = self.journal.as_mut() {
            journal.append_puts(&records).await?;
        }
        for record in records {
            self.table.put(record);
        }
        Ok(())
    }

    /// Apply `f` to the record `lease` still holds, then commit it.
    async fn update_held(
        &mut self,
        lease: &Lease,
        f: impl FnOnce(&mut TaskRecord),
    ) -> Result<TaskRecord, CourierError> {
        let mut record = self.table.held(lease)?.clone();
        f(&mut record);
        self.commit(vec![record.clone()]).await?;
        Ok(record)
    }
}

pub struct LocalTaskStore {
    inner: Mutex<Inner>,
}

impl LocalTaskStore {
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner {
                table: TaskTable::new(),
                journal: None,
            }),
        }
    }

    /// Replay the journal at `path`.
    ///
    /// Tasks that were Running when the previous process stopped are moved
    /// back to Pending right away, keeping their place in line.
    pub async fn open(path: impl AsRef<Path>, now: DateTime<Utc>) -> Result<Self, CourierError> {
        let (journal, entries) = FileJournal::<TaskId, TaskRecord>::open(path).await?;

        let mut inner = Inner {
            table: fold_entries(entries),
            journal: Some(journal),
        };

        let orphaned = inner.table.release_all_running(now);
        if !orphaned.is_empty() {
            info!(count = orphaned.len(), "releasing tasks left running by a previous process");
            inner.commit(orphaned).await?;
        }
        info!(tasks = inner.table.len(), counts = ?inner.table.counts(), "task store opened");

        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// Counts as recorded in the journal at `path`, for inspecting a store
    /// another process owns. Nothing is written, and running tasks stay running.
    pub async fn snapshot_counts(path: impl AsRef<Path>) -> Result<QueueCounts, CourierError> {
        let entries = FileJournal::<TaskId, TaskRecord>::read_entries(path).await?;
        Ok(fold_entries(entries).counts())
    }
}

fn fold_entries(entries: Vec<JournalEntry<TaskId, TaskRecord>>) -> TaskTable {
    let mut latest: HashMap<TaskId, TaskRecord> = HashMap::new();
    for entry in entries {
        match entry {
            JournalEntry::Put { record } => {
                latest.insert(record.task_id(), record);
            }
            JournalEntry::Remove { key } => {
                latest.remove(&key);
            }
        }
    }
    TaskTable::from_records(latest.into_values())
}

#[async_trait]
impl TaskStore for LocalTaskStore {
    async fn insert(&self, mut record: TaskRecord) -> Result<TaskRecord, CourierError> {
        let mut inner = self.inner.lock().await;
        if inner.table.get(record.task_id()).is_some() {
            return Err(CourierError::InvalidArgument(format!(
                "duplicate task id {}",
                record.task_id()
            )));
        }
        record.seq = inner.table.allocate_seq();
        inner.commit(vec![record.clone()]).await?;
        Ok(record)
    }

    async fn claim_next(&self, request: ClaimRequest) -> Result<Option<ClaimedTask>, CourierError> {
        let mut inner = self.inner.lock().await;

        let released = inner.table.expired_leases(request.now);
        if !released.is_empty() {
            for record in &released {
                warn!(
                    task_id = %record.task_id(),
                    task_type = %record.envelope.task_type(),
                    attempt = record.attempts,
                    "lease expired, returning task to pending"
                );
            }
            inner.commit(released).await?;
        }

        let Some(mut record) = inner.table.peek_due(request.now).cloned() else {
            return Ok(None);
        };

        let lease = Lease {
            lease_id: request.lease_id,
            task_id: record.task_id(),
            worker: request.worker,
            expires_at: request.now + request.lease_ttl,
        };
        record.claim(lease.clone(), request.now);
        inner.commit(vec![record.clone()]).await?;

        debug!(task_id = %record.task_id(), worker = %lease.worker, attempt = record.attempts, "claimed");
        Ok(Some(ClaimedTask { lease, record }))
    }

    async fn renew(
        &self,
        lease: &Lease,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        let mut inner = self.inner.lock().await;
        inner
            .update_held(lease, |r| r.renew(expires_at, now))
            .await
            .map(|_| ())
    }

    async fn complete(&self, lease: &Lease, now: DateTime<Utc>) -> Result<TaskRecord, CourierError> {
        let mut inner = self.inner.lock().await;
        inner.update_held(lease, |r| r.mark_done(now)).await
    }

    async fn retry(
        &self,
        lease: &Lease,
        not_before: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<TaskRecord, CourierError> {
        let mut inner = self.inner.lock().await;
        inner
            .update_held(lease, |r| r.schedule_retry(not_before, error.to_string(), now))
            .await
    }

    async fn fail(
        &self,
        lease: &Lease,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<TaskRecord, CourierError> {
        let mut inner = self.inner.lock().await;
        inner
            .update_held(lease, |r| r.mark_failed(error.to_string(), now))
            .await
    }

    async fn get(&self, task_id: TaskId) -> Result<Option<TaskRecord>, CourierError> {
        Ok(self.inner.lock().await.table.get(task_id).cloned())
    }

    async fn counts(&self) -> Result<QueueCounts, CourierError> {
        Ok(self.inner.lock().await.table.counts())
    }

    async fn next_due_at(&self) -> Result<Option<DateTime<Utc>>, CourierError> {
        Ok(self.inner.lock().await.table.next_due_at())
    }

    async fn purge_terminal(&self, cutoff: DateTime<Utc>) -> Result<usize, CourierError> {
        let mut inner = self.inner.lock().await;
        let expired = inner.table.terminal_before(cutoff);
        if expired.is_empty() {
            return Ok(0);
        }

        // journal を先に書き換え、成功してから table から消す
        let Inner { table, journal } = &mut *inner;
        if let Some(journal) = journal.as_mut() {
            let doomed: HashSet<TaskId> = expired.iter().copied().collect();
            journal
                .rewrite(table.records().filter(|r| !doomed.contains(&r.task_id())))
                .await?;
        }
        for task_id in &expired {
            table.remove(*task_id);
        }
        Ok(expired.len())
    }
}
