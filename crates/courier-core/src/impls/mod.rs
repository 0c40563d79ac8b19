//! Impls - ports のローカル実装
//!
//! # 含まれる実装
//! - **LocalTaskStore**: in-memory / JSON-lines journal の TaskStore
//! - **LocalMessageStore**: in-memory / JSON-lines journal の MessageStore
//! - **FileJournal**: 両ストアが共有する append-only ログ
//!
//! どちらのストアも 1 プロセスが journal ファイルを専有する前提です。

pub mod journal;
pub mod message_store;
pub mod task_store;

pub use self::journal::{FileJournal, JournalEntry};
pub use self::message_store::LocalMessageStore;
pub use self::task_store::LocalTaskStore;
