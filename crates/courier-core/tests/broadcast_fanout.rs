use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use courier_core::broadcast::{Broadcaster, DeliveryEnd, DeliveryOptions, spawn_delivery};
use courier_core::config::{BroadcastConfig, OverflowPolicy};
use courier_core::domain::{ChatEvent, MessageId};
use courier_core::ports::{EventSink, SendStatus};

fn deleted(id: u64) -> ChatEvent {
    ChatEvent::MessageDeleted {
        id: MessageId::new(id),
    }
}

/// Collects everything it is given.
#[derive(Default)]
struct CollectingSink {
    seen: Mutex<Vec<u64>>,
}

impl EventSink for CollectingSink {
    fn try_send(&self, event: &ChatEvent) -> SendStatus {
        self.seen.lock().push(event.message_id().get());
        SendStatus::Sent
    }
}

/// A transport that never drains until told to close.
#[derive(Default)]
struct StuckSink {
    closed: AtomicBool,
}

impl EventSink for StuckSink {
    fn try_send(&self, _event: &ChatEvent) -> SendStatus {
        if self.closed.load(Ordering::SeqCst) {
            SendStatus::Closed
        } else {
            SendStatus::WouldBlock
        }
    }
}

#[test]
fn concurrent_publishers_yield_one_order_for_everyone() {
    let hub = Broadcaster::new(BroadcastConfig {
        buffer_capacity: 10_000,
        overflow: OverflowPolicy::DropOldest,
    });
    let mut subs: Vec<_> = (0..4).map(|_| hub.subscribe()).collect();

    let publishers: Vec<_> = (0..4u64)
        .map(|p| {
            let hub = hub.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    hub.publish(deleted(p * 1_000 + i));
                }
            })
        })
        .collect();
    for publisher in publishers {
        publisher.join().unwrap();
    }

    let sequences: Vec<Vec<u64>> = subs
        .iter_mut()
        .map(|sub| {
            std::iter::from_fn(|| sub.try_recv())
                .map(|e| e.message_id().get())
                .collect()
        })
        .collect();

    assert_eq!(sequences[0].len(), 2_000);
    for seq in &sequences[1..] {
        assert_eq!(seq, &sequences[0]);
    }
    // 各 publisher 内の順序も保たれている
    for p in 0..4u64 {
        let own: Vec<u64> = sequences[0]
            .iter()
            .copied()
            .filter(|id| id / 1_000 == p)
            .collect();
        assert_eq!(own, (0..500).map(|i| p * 1_000 + i).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn stuck_transport_does_not_delay_a_fast_one() {
    let hub = Broadcaster::new(BroadcastConfig {
        buffer_capacity: 8,
        overflow: OverflowPolicy::DropOldest,
    });
    let options = DeliveryOptions {
        max_attempts: 1_000,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    };

    let stuck = Arc::new(StuckSink::default());
    let fast = Arc::new(CollectingSink::default());
    let stuck_task = spawn_delivery(hub.subscribe(), stuck.clone(), options.clone());
    let fast_sub = hub.subscribe();
    let fast_id = fast_sub.id();
    let fast_task = spawn_delivery(fast_sub, fast.clone(), options);

    for i in 1..=100 {
        assert_eq!(hub.publish(deleted(i)), 2);
        tokio::task::yield_now().await;
        if i % 10 == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while fast.seen.lock().len() < 100 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(*fast.seen.lock(), (1..=100).collect::<Vec<_>>());

    stuck.closed.store(true, Ordering::SeqCst);
    assert_eq!(stuck_task.await.unwrap(), DeliveryEnd::SinkClosed);
    assert_eq!(hub.subscriber_count(), 1);

    hub.unsubscribe(fast_id);
    assert_eq!(fast_task.await.unwrap(), DeliveryEnd::Unsubscribed);
    assert_eq!(hub.subscriber_count(), 0);
}

#[test]
fn events_serialize_in_wire_shape() {
    let v = serde_json::to_value(deleted(7)).unwrap();
    assert_eq!(v, serde_json::json!({ "type": "messageDeleted", "id": 7 }));
}
