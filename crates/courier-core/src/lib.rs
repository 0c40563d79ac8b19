//! courier-core
//!
//! Delayed background tasks and real-time chat fan-out.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, message, events, decision, errors）
//! - **queue**: タスクの状態機械（TaskRecord, Lease, RetryPolicy, TaskTable）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, TaskStore, MessageStore, EventSink）
//! - **impls**: ローカル実装（LocalTaskStore, LocalMessageStore, FileJournal）
//! - **typed**: 型付き Task API（Task trait, Handler trait, TypedRegistry）
//! - **broadcast**: Broadcaster / Subscription / delivery loop
//! - **app**: アプリケーションロジック（builder, runtime, worker_loop, gc_loop, chat）
//! - **jobs**: 組み込みタスク（request log）
//! - **config**: 設定の読み込み

pub mod app;
pub mod broadcast;
pub mod config;
pub mod domain;
pub mod impls;
pub mod jobs;
pub mod ports;
pub mod queue;
pub mod typed;

pub use app::{ChatService, DelayedTaskQueue, PollOutcome, QueueBuilder, WorkerPool};
pub use broadcast::{Broadcaster, Subscription};
pub use config::CourierConfig;
pub use domain::{CourierError, ErrorKind};
