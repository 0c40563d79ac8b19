//! Status - ステータスクエリ
//!
//! 運用者向けの読み取り専用ビュー。ストアの内部表現は見せない。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{TaskId, TaskType};
use crate::queue::{TaskRecord, TaskState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.done + self.failed
    }
}

/// Snapshot of one task, as returned by `DelayedTaskQueue::status`.
///
/// # 使用例
/// ```ignore
/// let status = queue.status(task_id).await?;
/// println!("{:?}", status);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub state: TaskState,
    pub attempts: u32,
    pub max_attempts: u32,
    pub not_before: DateTime<Utc>,
    pub last_error: Option<String>,
    /// Worker holding the lease, while Running.
    pub worker: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&TaskRecord> for TaskStatus {
    fn from(record: &TaskRecord) -> Self {
        Self {
            task_id: record.task_id(),
            task_type: record.envelope.task_type().clone(),
            state: record.state,
            attempts: record.attempts,
            max_attempts: record.max_attempts,
            not_before: record.not_before,
            last_error: record.last_error.clone(),
            worker: record.lease.as_ref().map(|l| l.worker.clone()),
            updated_at: record.updated_at,
        }
    }
}
