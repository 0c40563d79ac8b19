//! Broadcast - チャットイベントのリアルタイム配信
//!
//! # 主要コンポーネント
//! - **Broadcaster**: 購読者集合を持ち、publish 順を全員に保証する
//! - **Subscription**: 購読者ごとの有界バッファ（drop で自動解除）
//! - **spawn_delivery**: Subscription → EventSink（WebSocket 等）への送出タスク

mod delivery;
mod hub;
mod subscription;

pub use self::delivery::{DeliveryEnd, DeliveryOptions, spawn_delivery};
pub use self::hub::Broadcaster;
pub use self::subscription::{Subscription, SubscriptionId};
