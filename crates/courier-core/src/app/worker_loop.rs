//! WorkerPool - タスク実行ループ
//!
//! # フロー（ワーカー 1 本あたり）
//! 1. shutdown が来ていたら抜ける
//! 2. DelayedTaskQueue::poll_and_run() で 1 件実行
//! 3. 何もなければ poll_interval だけ眠る（shutdown で起こされる）

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::runtime::DelayedTaskQueue;

/// Worker group handle.
/// - `request_shutdown()` で新しい claim を止める（実行中の handler は最後まで走る）
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `n` workers named `worker-0` .. `worker-{n-1}`.
    pub fn spawn(n: usize, queue: Arc<DelayedTaskQueue>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poll_interval = queue.settings().poll_interval;

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let q = Arc::clone(&queue);
            let mut rx = shutdown_rx.clone();
            let name = format!("worker-{worker_id}");

            let join = tokio::spawn(async move {
                worker_loop(&name, q, poll_interval, &mut rx).await;
            });
            joins.push(join);
        }
        info!(workers = n, "worker pool started");

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// A receiver that flips to `true` on shutdown, for companion loops.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Request shutdown for all workers.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
        info!("worker pool stopped");
    }
}

async fn worker_loop(
    name: &str,
    queue: Arc<DelayedTaskQueue>,
    poll_interval: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    debug!(worker = name, "worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // handler 実行中は shutdown と競合させない（in-flight は最後まで走らせる）
        let idle = match queue.poll_and_run(name).await {
            Ok(outcome) => outcome.is_idle(),
            Err(e) => {
                error!(worker = name, error = %e, "poll failed");
                true
            }
        };
        if !idle {
            continue;
        }

        tokio::select! {
            _ = shutdown_rx.changed() => {}
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
    debug!(worker = name, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::QueueBuilder;
    use crate::domain::CourierError;
    use crate::typed::{Handler, Task};
    use async_trait::async_trait;
    use chrono::TimeDelta;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Serialize, Deserialize)]
    struct Count;

    impl Task for Count {
        const TYPE: &'static str = "test.count.v1";
    }

    struct CountHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl Handler<Count> for CountHandler {
        async fn handle(&self, _task: Count) -> Result<(), CourierError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn pool_drains_queue_and_stops() {
        let counter = Arc::new(AtomicUsize::new(0));
        let queue = Arc::new(
            QueueBuilder::new()
                .register::<Count, _>(CountHandler(counter.clone()))
                .unwrap()
                .build()
                .unwrap(),
        );
        for _ in 0..20 {
            queue.enqueue(&Count, TimeDelta::zero()).await.unwrap();
        }

        let pool = WorkerPool::spawn(4, Arc::clone(&queue));
        assert_eq!(pool.len(), 4);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while queue.counts().await.unwrap().done < 20 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        pool.shutdown_and_join().await;

        assert_eq!(counter.load(Ordering::SeqCst), 20);
        assert_eq!(queue.counts().await.unwrap().done, 20);
    }
}
