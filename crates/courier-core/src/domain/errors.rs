//! Errors - エラー型と分類

use thiserror::Error;

use super::ids::{LeaseId, TaskId};
use super::message::MessageId;

/// Operational classification of a [`CourierError`].
///
/// - Transient: retry is expected to help
/// - Permanent: retrying is pointless
/// - Infrastructure: storage / IO trouble (treated as retriable by the queue)
/// - Rejected: caller input refused, nothing changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
    Rejected,
}

#[derive(Debug, Error)]
pub enum CourierError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no handler registered for task_type={0}")]
    UnknownTaskType(String),

    #[error("retriable failure: {0}")]
    Retriable(String),

    #[error("permanent failure: {0}")]
    Permanent(String),

    #[error("{lease} on {task} is no longer held")]
    LeaseLost { task: TaskId, lease: LeaseId },

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CourierError {
    pub fn retriable(msg: impl Into<String>) -> Self {
        Self::Retriable(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Retriable(_) | Self::LeaseLost { .. } => ErrorKind::Transient,
            Self::Permanent(_) | Self::UnknownTaskType(_) | Self::Json(_) => ErrorKind::Permanent,
            Self::Storage(_) | Self::Io(_) => ErrorKind::Infrastructure,
            Self::InvalidArgument(_)
            | Self::TaskNotFound(_)
            | Self::Validation(_)
            | Self::PermissionDenied(_)
            | Self::MessageNotFound(_) => ErrorKind::Rejected,
        }
    }

    /// Whether a handler failure of this kind should be retried.
    pub fn is_retriable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::Infrastructure)
    }
}
