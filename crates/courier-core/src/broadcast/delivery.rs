//! Delivery loop - Subscription から EventSink へ流すタスク
//!
//! 1 購読 = 1 タスク。publish 側とは Subscription のバッファだけで繋がる。
//! - WouldBlock: 同じイベントを持ったまま backoff して再送（回数上限あり）
//! - Closed: Subscription を drop して購読解除。publisher にはエラーを返さない

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Subscription;
use crate::ports::{EventSink, SendStatus};

#[derive(Debug, Clone)]
pub struct DeliveryOptions {
    /// Sends attempted per event before it is skipped.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(500),
        }
    }
}

/// How a delivery loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryEnd {
    /// The subscription was closed (unsubscribed, disconnected or hub dropped).
    Unsubscribed,
    /// The sink reported the peer gone.
    SinkClosed,
}

pub fn spawn_delivery(
    subscription: Subscription,
    sink: Arc<dyn EventSink>,
    options: DeliveryOptions,
) -> JoinHandle<DeliveryEnd> {
    tokio::spawn(deliver(subscription, sink, options))
}

async fn deliver(
    mut subscription: Subscription,
    sink: Arc<dyn EventSink>,
    options: DeliveryOptions,
) -> DeliveryEnd {
    let id = subscription.id();

    while let Some(event) = subscription.recv().await {
        let mut backoff = options.initial_backoff;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match sink.try_send(&event) {
                SendStatus::Sent => break,
                SendStatus::Closed => {
                    debug!(subscription = %id, "sink closed, unsubscribing");
                    return DeliveryEnd::SinkClosed;
                }
                SendStatus::WouldBlock if attempt >= options.max_attempts => {
                    warn!(
                        subscription = %id,
                        event = event.kind(),
                        attempts = attempt,
                        "sink stayed blocked, skipping event"
                    );
                    break;
                }
                SendStatus::WouldBlock => {
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(options.max_backoff);
                }
            }
        }
    }

    debug!(subscription = %id, "subscription closed, delivery finished");
    DeliveryEnd::Unsubscribed
}
