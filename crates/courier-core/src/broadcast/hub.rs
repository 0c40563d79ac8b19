//! Broadcaster - チャットイベントの fan-out
//!
//! publish は登録表のロックを 1 回だけ取り、その中で全購読者のバッファに積む。
//! したがって全購読者が同じ順序でイベントを見る。購読者側の処理は一切待たない。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::subscription::{PushResult, SubscriberBuffer, Subscription, SubscriptionId};
use crate::config::{BroadcastConfig, OverflowPolicy};
use crate::domain::ChatEvent;

pub(crate) struct Shared {
    registry: Mutex<HashMap<SubscriptionId, Arc<SubscriberBuffer>>>,
    next_id: AtomicU64,
    config: BroadcastConfig,
}

impl Shared {
    /// Idempotent.
    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let removed = self.registry.lock().remove(&id);
        match removed {
            Some(buffer) => {
                buffer.close();
                debug!(subscription = %id, "unsubscribed");
                true
            }
            None => false,
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // 残っている購読者の recv() を終わらせる
        for buffer in self.registry.get_mut().values() {
            buffer.close();
        }
    }
}

/// Cheap to clone; clones share the subscriber set.
#[derive(Clone)]
pub struct Broadcaster {
    shared: Arc<Shared>,
}

impl Broadcaster {
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                config,
            }),
        }
    }

    /// Register a new subscriber. It receives every event published after this
    /// call returns.
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId::new(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let buffer = Arc::new(SubscriberBuffer::new(self.shared.config.buffer_capacity));
        self.shared.registry.lock().insert(id, Arc::clone(&buffer));
        debug!(subscription = %id, "subscribed");
        Subscription::new(id, buffer, Arc::downgrade(&self.shared))
    }

    /// Removes the subscriber if it is still registered. Returns whether it was.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.remove(id)
    }

    /// Fan `event` out to every live subscriber. Returns how many received it.
    pub fn publish(&self, event: ChatEvent) -> usize {
        let event = Arc::new(event);
        let drop_oldest = self.shared.config.overflow == OverflowPolicy::DropOldest;

        let mut registry = self.shared.registry.lock();
        let mut delivered = 0;
        let mut evicted = Vec::new();
        for (id, buffer) in registry.iter() {
            match buffer.push(Arc::clone(&event), drop_oldest) {
                PushResult::Queued => delivered += 1,
                PushResult::QueuedDroppingOldest => {
                    delivered += 1;
                    debug!(subscription = %id, "buffer full, dropped oldest event");
                }
                PushResult::Full | PushResult::Closed => evicted.push(*id),
            }
        }
        for id in evicted {
            if let Some(buffer) = registry.remove(&id) {
                buffer.close();
                warn!(subscription = %id, "subscriber too slow, disconnected");
            }
        }
        drop(registry);

        debug!(event = event.kind(), recipients = delivered, "published");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.registry.lock().len()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(BroadcastConfig::default())
    }
}
