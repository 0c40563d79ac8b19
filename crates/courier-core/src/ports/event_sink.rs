//! EventSink port - the transport behind one subscription.
//!
//! WebSocket / SSE などの接続そのものは呼び出し側の責務。
//! コアが必要とするのは「1 件送る → ok | would-block | closed」だけ。

use crate::domain::ChatEvent;

/// Result of a non-blocking send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Sent,
    /// Transport buffer full; try again later with the same event.
    WouldBlock,
    /// Peer went away; the subscription should be dropped.
    Closed,
}

pub trait EventSink: Send + Sync {
    fn try_send(&self, event: &ChatEvent) -> SendStatus;
}
