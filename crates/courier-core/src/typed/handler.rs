//! Handler - 型付き Task の実行者
//!
//! queue はペイロードをバイト列としてしか知らない。`JsonHandler` が
//! `TaskEnvelope` のペイロードを `T` に decode してから `Handler<T>` に渡す。

use std::marker::PhantomData;

use async_trait::async_trait;

use super::task::Task;
use crate::domain::{CourierError, TaskEnvelope};

/// Executes one kind of task.
///
/// ```ignore
/// struct SendDigest;
///
/// #[async_trait]
/// impl Handler<Digest> for SendDigest {
///     async fn handle(&self, digest: Digest) -> Result<(), CourierError> {
///         tracing::info!(user = digest.user_id, "sending digest");
///         Ok(())
///     }
/// }
/// ```
///
/// `CourierError::Retriable` やインフラ系エラーは backoff 後に再実行、
/// `Permanent` は即 failed になる。
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn handle(&self, task: T) -> Result<(), CourierError>;
}

/// Object-safe form stored in the registry.
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn run(&self, envelope: &TaskEnvelope) -> Result<(), CourierError>;
}

/// Decodes the JSON payload into `T` before calling the inner handler.
pub struct JsonHandler<T, H> {
    inner: H,
    _task: PhantomData<fn(T)>,
}

impl<T: Task, H: Handler<T>> JsonHandler<T, H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            _task: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> DynHandler for JsonHandler<T, H> {
    async fn run(&self, envelope: &TaskEnvelope) -> Result<(), CourierError> {
        let task: T = serde_json::from_slice(envelope.payload()).map_err(|e| {
            CourierError::Permanent(format!("cannot decode {} payload: {e}", T::TYPE))
        })?;
        self.inner.handle(task).await
    }
}
