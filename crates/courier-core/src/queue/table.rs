//! In-memory task table shared by every `TaskStore` implementation in this crate.
//!
//! The table only answers questions and applies already-decided records; it
//! never touches disk. Stores compute the next record, make it durable, and
//! then `put` it here, so what workers can see is never ahead of the journal.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};

use super::{Lease, TaskRecord, TaskState};
use crate::app::status::QueueCounts;
use crate::domain::{CourierError, TaskId};

/// Pending-index entry. Field order gives the claim order:
/// earliest `not_before` first, then enqueue order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ScheduledTask {
    not_before: DateTime<Utc>,
    seq: u64,
    task_id: TaskId,
}

impl ScheduledTask {
    fn of(record: &TaskRecord) -> Self {
        Self {
            not_before: record.not_before,
            seq: record.seq,
            task_id: record.task_id(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TaskTable {
    /// Single source of truth.
    records: HashMap<TaskId, TaskRecord>,

    /// Pending tasks, ordered for claiming.
    pending: BTreeSet<ScheduledTask>,

    /// Running tasks, scanned for expired leases.
    running: HashSet<TaskId>,

    next_seq: u64,
}

impl TaskTable {
    pub fn new() -> Self {
        Self {
            next_seq: 1,
            ..Self::default()
        }
    }

    /// Rebuild indexes from persisted records.
    pub fn from_records(records: impl IntoIterator<Item = TaskRecord>) -> Self {
        let mut table = Self::new();
        for record in records {
            table.next_seq = table.next_seq.max(record.seq + 1);
            table.put(record);
        }
        table
    }

    pub fn allocate_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, task_id: TaskId) -> Option<&TaskRecord> {
        self.records.get(&task_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &TaskRecord> {
        self.records.values()
    }

    /// Insert or replace a record, keeping the indexes in sync.
    pub fn put(&mut self, record: TaskRecord) {
        let task_id = record.task_id();
        self.unindex(task_id);
        match record.state {
            TaskState::Pending => {
                self.pending.insert(ScheduledTask::of(&record));
            }
            TaskState::Running => {
                self.running.insert(task_id);
            }
            TaskState::Done | TaskState::Failed => {}
        }
        self.records.insert(task_id, record);
    }

    pub fn remove(&mut self, task_id: TaskId) -> Option<TaskRecord> {
        self.unindex(task_id);
        self.records.remove(&task_id)
    }

    fn unindex(&mut self, task_id: TaskId) {
        if let Some(old) = self.records.get(&task_id) {
            match old.state {
                TaskState::Pending => {
                    self.pending.remove(&ScheduledTask::of(old));
                }
                TaskState::Running => {
                    self.running.remove(&task_id);
                }
                TaskState::Done | TaskState::Failed => {}
            }
        }
    }

    /// Copies of running records whose lease has run out, already moved back
    /// to Pending. Nothing is applied.
    pub fn expired_leases(&self, now: DateTime<Utc>) -> Vec<TaskRecord> {
        let mut released: Vec<TaskRecord> = self
            .running
            .iter()
            .filter_map(|id| self.records.get(id))
            .filter(|r| r.lease_expired(now))
            .cloned()
            .collect();
        for record in &mut released {
            record.release_expired(now);
        }
        released
    }

    /// Every running record, released. Used when a store is reopened and the
    /// previous owner of those leases is known to be gone.
    pub fn release_all_running(&self, now: DateTime<Utc>) -> Vec<TaskRecord> {
        let mut released: Vec<TaskRecord> = self
            .running
            .iter()
            .filter_map(|id| self.records.get(id))
            .cloned()
            .collect();
        for record in &mut released {
            record.release_expired(now);
        }
        released
    }

    /// The next task to claim, if one is due.
    pub fn peek_due(&self, now: DateTime<Utc>) -> Option<&TaskRecord> {
        let head = self.pending.first()?;
        if head.not_before > now {
            return None;
        }
        self.records.get(&head.task_id)
    }

    /// Earliest `not_before` among pending tasks.
    pub fn next_due_at(&self) -> Option<DateTime<Utc>> {
        self.pending.first().map(|s| s.not_before)
    }

    /// The record `lease` refers to, provided the lease still owns it.
    pub fn held(&self, lease: &Lease) -> Result<&TaskRecord, CourierError> {
        let record = self
            .records
            .get(&lease.task_id)
            .ok_or(CourierError::TaskNotFound(lease.task_id))?;
        if !record.is_held_by(lease.lease_id) {
            return Err(CourierError::LeaseLost {
                task: lease.task_id,
                lease: lease.lease_id,
            });
        }
        Ok(record)
    }

    /// Terminal tasks last touched before `cutoff`.
    pub fn terminal_before(&self, cutoff: DateTime<Utc>) -> Vec<TaskId> {
        self.records
            .values()
            .filter(|r| r.state.is_terminal() && r.updated_at < cutoff)
            .map(TaskRecord::task_id)
            .collect()
    }

    pub fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for record in self.records.values() {
            match record.state {
                TaskState::Pending => counts.pending += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Done => counts.done += 1,
                TaskState::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LeaseId, TaskEnvelope, TaskType};
    use chrono::TimeDelta;
    use ulid::Ulid;

    fn pending(table: &mut TaskTable, not_before: DateTime<Utc>, now: DateTime<Utc>) -> TaskId {
        let id = TaskId::from_ulid(Ulid::new());
        let env = TaskEnvelope::new(id, TaskType::new("t"), vec![]);
        let mut record = TaskRecord::new(env, not_before, 3, now);
        record.seq = table.allocate_seq();
        table.put(record);
        id
    }

    fn claim(table: &mut TaskTable, id: TaskId, now: DateTime<Utc>, ttl: TimeDelta) -> Lease {
        let lease = Lease {
            lease_id: LeaseId::from_ulid(Ulid::new()),
            task_id: id,
            worker: "w".into(),
            expires_at: now + ttl,
        };
        let mut record = table.get(id).cloned().unwrap();
        record.claim(lease.clone(), now);
        table.put(record);
        lease
    }

    #[test]
    fn claims_earliest_not_before_then_fifo() {
        let now = Utc::now();
        let mut table = TaskTable::new();
        let late = pending(&mut table, now + TimeDelta::seconds(5), now);
        let first = pending(&mut table, now, now);
        let second = pending(&mut table, now, now);

        let later = now + TimeDelta::seconds(10);
        assert_eq!(table.peek_due(later).unwrap().task_id(), first);
        claim(&mut table, first, later, TimeDelta::seconds(30));
        assert_eq!(table.peek_due(later).unwrap().task_id(), second);
        claim(&mut table, second, later, TimeDelta::seconds(30));
        assert_eq!(table.peek_due(later).unwrap().task_id(), late);
    }

    #[test]
    fn nothing_due_before_not_before() {
        let now = Utc::now();
        let mut table = TaskTable::new();
        pending(&mut table, now + TimeDelta::milliseconds(1000), now);

        assert!(table.peek_due(now + TimeDelta::milliseconds(999)).is_none());
        assert!(table.peek_due(now + TimeDelta::milliseconds(1000)).is_some());
        assert_eq!(table.next_due_at(), Some(now + TimeDelta::milliseconds(1000)));
    }

    #[test]
    fn stale_lease_is_rejected() {
        let now = Utc::now();
        let mut table = TaskTable::new();
        let id = pending(&mut table, now, now);
        let first = claim(&mut table, id, now, TimeDelta::seconds(1));

        let later = now + TimeDelta::seconds(2);
        for released in table.expired_leases(later) {
            table.put(released);
        }
        let second = claim(&mut table, id, later, TimeDelta::seconds(1));

        assert!(matches!(table.held(&first), Err(CourierError::LeaseLost { .. })));
        assert!(table.held(&second).is_ok());
        assert_eq!(table.get(id).unwrap().attempts, 2);
    }

    #[test]
    fn counts_and_indexes_follow_put() {
        let now = Utc::now();
        let mut table = TaskTable::new();
        let a = pending(&mut table, now, now);
        pending(&mut table, now, now);
        claim(&mut table, a, now, TimeDelta::seconds(30));

        let counts = table.counts();
        assert_eq!((counts.pending, counts.running), (1, 1));
        assert!(table.expired_leases(now).is_empty());
        assert_eq!(table.release_all_running(now).len(), 1);
    }

    #[test]
    fn from_records_continues_sequence() {
        let now = Utc::now();
        let mut table = TaskTable::new();
        pending(&mut table, now, now);
        pending(&mut table, now, now);

        let records: Vec<_> = table.records().cloned().collect();
        let mut rebuilt = TaskTable::from_records(records);
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(rebuilt.allocate_seq(), 3);
    }
}
