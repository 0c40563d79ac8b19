//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **QueueBuilder**: DelayedTaskQueue の構築とワイヤリング
//! - **DelayedTaskQueue**: enqueue / poll_and_run / status
//! - **WorkerPool**: タスク実行ループ（claim→handle→decide→complete）
//! - **GcLoop**: 終了済みタスクの削除
//! - **ChatService**: メッセージ投稿・削除と配信

pub mod builder;
pub mod chat;
pub mod gc_loop;
pub mod runtime;
pub mod status;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, QueueBuilder};
pub use self::chat::{ChatService, PostMessageInput};
pub use self::gc_loop::GcLoop;
pub use self::runtime::{DelayedTaskQueue, PollOutcome, QueueSettings};
pub use self::status::{QueueCounts, TaskStatus};
pub use self::worker_loop::WorkerPool;
