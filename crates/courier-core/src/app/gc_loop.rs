//! GcLoop - 終了済みタスクのガベージコレクション
//!
//! # フロー
//! 1. gc_interval ごとに updated_at < now - retention の Done/Failed を探す
//! 2. TaskStore::purge_terminal() で削除（journal も compaction される）

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::domain::CourierError;
use crate::ports::{Clock, TaskStore};

pub struct GcLoop {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    retention: TimeDelta,
    interval: Duration,
}

impl GcLoop {
    pub fn new(
        store: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        retention: TimeDelta,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            retention,
            interval,
        }
    }

    pub fn from_config(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>, config: &QueueConfig) -> Self {
        Self::new(store, clock, config.retention(), config.gc_interval())
    }

    /// One sweep. Returns how many tasks were purged.
    pub async fn run_once(&self) -> Result<usize, CourierError> {
        let cutoff = self.clock.now() - self.retention;
        let purged = self.store.purge_terminal(cutoff).await?;
        if purged > 0 {
            info!(purged, cutoff = %cutoff, "purged finished tasks");
        } else {
            debug!(cutoff = %cutoff, "nothing to purge");
        }
        Ok(purged)
    }

    /// Sweep every `interval` until `shutdown` flips to true.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = tokio::time::sleep(self.interval) => {
                        if let Err(e) = self.run_once().await {
                            warn!(error = %e, "gc sweep failed");
                        }
                    }
                }
                if *shutdown.borrow() {
                    break;
                }
            }
        })
    }
}
