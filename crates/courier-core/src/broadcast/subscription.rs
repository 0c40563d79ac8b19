//! Subscription - 1 接続ぶんの受信口
//!
//! - バッファは購読者ごとに独立（遅い購読者が他を待たせない）
//! - handle を drop すると Broadcaster から自動で外れる

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::hub::Shared;
use crate::domain::ChatEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// What `push` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushResult {
    Queued,
    /// Queued after evicting the oldest buffered event.
    QueuedDroppingOldest,
    /// Buffer full and the policy is to disconnect; nothing queued.
    Full,
    Closed,
}

#[derive(Debug, Default)]
struct BufferState {
    events: VecDeque<Arc<ChatEvent>>,
    closed: bool,
    dropped: u64,
}

/// Bounded per-subscriber buffer shared by the hub and the handle.
#[derive(Debug)]
pub(crate) struct SubscriberBuffer {
    capacity: usize,
    state: Mutex<BufferState>,
    notify: Notify,
}

impl SubscriberBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(BufferState::default()),
            notify: Notify::new(),
        }
    }

    pub(crate) fn push(&self, event: Arc<ChatEvent>, drop_oldest: bool) -> PushResult {
        let mut state = self.state.lock();
        if state.closed {
            return PushResult::Closed;
        }
        let mut result = PushResult::Queued;
        if state.events.len() >= self.capacity {
            if !drop_oldest {
                return PushResult::Full;
            }
            state.events.pop_front();
            state.dropped += 1;
            result = PushResult::QueuedDroppingOldest;
        }
        state.events.push_back(event);
        drop(state);
        self.notify.notify_one();
        result
    }

    /// Stop accepting events. Already buffered events can still be received.
    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    fn pop(&self) -> Result<Option<Arc<ChatEvent>>, ()> {
        let mut state = self.state.lock();
        match state.events.pop_front() {
            Some(event) => Ok(Some(event)),
            None if state.closed => Err(()),
            None => Ok(None),
        }
    }
}

/// Receiving end of one subscription.
pub struct Subscription {
    id: SubscriptionId,
    buffer: Arc<SubscriberBuffer>,
    hub: Weak<Shared>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, buffer: Arc<SubscriberBuffer>, hub: Weak<Shared>) -> Self {
        Self { id, buffer, hub }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next event in publish order. `None` once the subscription is closed and
    /// its buffer drained.
    pub async fn recv(&mut self) -> Option<Arc<ChatEvent>> {
        loop {
            match self.buffer.pop() {
                Ok(Some(event)) => return Some(event),
                Err(()) => return None,
                Ok(None) => self.buffer.notify.notified().await,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Arc<ChatEvent>> {
        self.buffer.pop().ok().flatten()
    }

    /// Events evicted from this subscription's buffer so far.
    pub fn dropped(&self) -> u64 {
        self.buffer.state.lock().dropped
    }

    pub fn pending(&self) -> usize {
        self.buffer.state.lock().events.len()
    }

    pub fn is_closed(&self) -> bool {
        self.buffer.state.lock().closed
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("pending", &self.pending())
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
        self.buffer.close();
    }
}
