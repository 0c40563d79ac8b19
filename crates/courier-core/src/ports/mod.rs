//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部システム（ストレージ、時計、接続）へのインターフェースを
//! 提供し、実装の詳細を隠蔽します。ローカル実装は `impls` にあります。

pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod message_store;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use self::event_sink::{EventSink, SendStatus};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::message_store::MessageStore;
pub use self::task_store::{ClaimRequest, ClaimedTask, TaskStore};
