//! DelayedTaskQueue - 型付き Task API の表面
//!
//! # poll_and_run のフロー
//! 1. TaskStore::claim_next() で期限切れ lease を回収しつつ 1 件 claim
//! 2. task_type から DynHandler を引く（無ければ即 failed）
//! 3. Handler 実行。実行中は lease_ttl / 3 ごとに heartbeat (renew)
//! 4. 失敗時は Decider で Retry / MarkFailed を決める
//! 5. complete / retry / fail で状態更新。lease を失っていたら結果は捨てる

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, info, warn};

use super::status::{QueueCounts, TaskStatus};
use crate::config::QueueConfig;
use crate::domain::{CourierError, Decider, Decision, TaskEnvelope, TaskId, TaskType};
use crate::ports::{ClaimRequest, ClaimedTask, Clock, IdGenerator, TaskStore};
use crate::queue::{Lease, TaskRecord};
use crate::typed::{DynHandler, Task, TypedRegistry};

/// Runtime knobs of a queue, derived from [`QueueConfig`].
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub max_attempts: u32,
    pub lease_ttl: TimeDelta,
    pub poll_interval: Duration,
}

impl QueueSettings {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            lease_ttl: config.lease_ttl(),
            poll_interval: config.poll_interval(),
        }
    }

    /// Heartbeat period while a handler runs.
    pub fn heartbeat_interval(&self) -> Duration {
        (self.lease_ttl / 3)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(Duration::from_millis(1))
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

/// Result of one `poll_and_run` call.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Nothing was due.
    Idle,
    Completed(TaskId),
    Retrying {
        task_id: TaskId,
        not_before: DateTime<Utc>,
    },
    Failed {
        task_id: TaskId,
        reason: String,
    },
    /// The lease was reclaimed by someone else; this worker's result was dropped.
    LeaseLost(TaskId),
}

impl PollOutcome {
    pub fn is_idle(&self) -> bool {
        matches!(self, PollOutcome::Idle)
    }
}

pub struct DelayedTaskQueue {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    registry: Arc<TypedRegistry>,
    decider: Arc<dyn Decider>,
    settings: QueueSettings,
}

impl DelayedTaskQueue {
    pub(crate) fn new(
        store: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        registry: TypedRegistry,
        decider: Arc<dyn Decider>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            registry: Arc::new(registry),
            decider,
            settings,
        }
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub fn registry(&self) -> &TypedRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Enqueue a typed task to run no earlier than `now + delay`.
    pub async fn enqueue<T: Task>(&self, task: &T, delay: TimeDelta) -> Result<TaskId, CourierError> {
        let payload = serde_json::to_vec(task)?;
        self.enqueue_raw(TaskType::new(T::TYPE), payload, delay).await
    }

    /// Enqueue an opaque payload. The task is durable once this returns.
    pub async fn enqueue_raw(
        &self,
        task_type: TaskType,
        payload: Vec<u8>,
        delay: TimeDelta,
    ) -> Result<TaskId, CourierError> {
        if delay < TimeDelta::zero() {
            return Err(CourierError::InvalidArgument(format!(
                "delay must not be negative (got {}ms)",
                delay.num_milliseconds()
            )));
        }

        let now = self.clock.now();
        let not_before = now.checked_add_signed(delay).ok_or_else(|| {
            CourierError::InvalidArgument(format!(
                "delay out of range ({}s from {now})",
                delay.num_seconds()
            ))
        })?;
        let task_id = self.ids.generate_task_id();
        let envelope = TaskEnvelope::new(task_id, task_type, payload);
        let record = TaskRecord::new(envelope, not_before, self.settings.max_attempts, now);
        let record = self.store.insert(record).await?;

        info!(
            task_id = %task_id,
            task_type = %record.envelope.task_type(),
            not_before = %record.not_before,
            "enqueued"
        );
        Ok(task_id)
    }

    /// Claim at most one due task and run it to a decision.
    pub async fn poll_and_run(&self, worker: &str) -> Result<PollOutcome, CourierError> {
        let request = ClaimRequest {
            now: self.clock.now(),
            worker: worker.to_string(),
            lease_id: self.ids.generate_lease_id(),
            lease_ttl: self.settings.lease_ttl,
        };
        let Some(ClaimedTask { lease, record }) = self.store.claim_next(request).await? else {
            return Ok(PollOutcome::Idle);
        };

        let task_id = record.task_id();
        let task_type = record.envelope.task_type().clone();
        debug!(task_id = %task_id, task_type = %task_type, worker, attempt = record.attempts, "running");

        let handler = match self.registry.resolve(&task_type) {
            Ok(handler) => handler,
            Err(err) => {
                error!(task_id = %task_id, task_type = %task_type, "{err}");
                return self.finish(&lease, &record, Err(err)).await;
            }
        };

        let result = match self.run_with_heartbeat(handler, &record, &lease).await {
            Some(result) => result,
            None => return Ok(PollOutcome::LeaseLost(task_id)),
        };
        self.finish(&lease, &record, result).await
    }

    /// Run the handler, renewing the lease meanwhile. `None` means the lease
    /// was lost and the handler was abandoned.
    async fn run_with_heartbeat(
        &self,
        handler: Arc<dyn DynHandler>,
        record: &TaskRecord,
        lease: &Lease,
    ) -> Option<Result<(), CourierError>> {
        let run = handler.run(&record.envelope);
        tokio::pin!(run);

        let mut heartbeat = tokio::time::interval(self.settings.heartbeat_interval());
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // 最初の tick は即時に来るので捨てる
        heartbeat.tick().await;

        loop {
            tokio::select! {
                result = &mut run => return Some(result),
                _ = heartbeat.tick() => {
                    let now = self.clock.now();
                    match self.store.renew(lease, now + self.settings.lease_ttl, now).await {
                        Ok(()) => debug!(task_id = %lease.task_id, "lease renewed"),
                        Err(CourierError::LeaseLost { .. }) => {
                            warn!(task_id = %lease.task_id, worker = %lease.worker, "lease lost while running, abandoning");
                            return None;
                        }
                        Err(e) => warn!(task_id = %lease.task_id, error = %e, "lease renewal failed"),
                    }
                }
            }
        }
    }

    async fn finish(
        &self,
        lease: &Lease,
        record: &TaskRecord,
        result: Result<(), CourierError>,
    ) -> Result<PollOutcome, CourierError> {
        let task_id = record.task_id();
        let now = self.clock.now();

        let outcome = match result {
            Ok(()) => self
                .store
                .complete(lease, now)
                .await
                .map(|_| PollOutcome::Completed(task_id)),
            Err(err) => {
                // 範囲外の retry 遅延は失敗として確定させる
                let next_run = match self.decider.decide(record, &err) {
                    Decision::Retry { delay, reason } => match now.checked_add_signed(delay) {
                        Some(not_before) => Ok((not_before, reason)),
                        None => Err(format!("retry delay out of range: {reason}")),
                    },
                    Decision::MarkFailed { reason } => Err(reason),
                };
                match next_run {
                    Ok((not_before, reason)) => {
                        warn!(task_id = %task_id, attempt = record.attempts, "{reason}");
                        self.store
                            .retry(lease, not_before, &err.to_string(), now)
                            .await
                            .map(|_| PollOutcome::Retrying {
                                task_id,
                                not_before,
                            })
                    }
                    Err(reason) => {
                        error!(task_id = %task_id, attempt = record.attempts, "{reason}");
                        self.store
                            .fail(lease, &reason, now)
                            .await
                            .map(|_| PollOutcome::Failed { task_id, reason })
                    }
                }
            }
        };

        match outcome {
            Ok(PollOutcome::Completed(id)) => {
                info!(task_id = %id, attempt = record.attempts, "completed");
                Ok(PollOutcome::Completed(id))
            }
            Err(CourierError::LeaseLost { .. }) => {
                warn!(task_id = %task_id, worker = %lease.worker, "lease lost before finishing, result dropped");
                Ok(PollOutcome::LeaseLost(task_id))
            }
            other => other,
        }
    }

    pub async fn status(&self, task_id: TaskId) -> Result<TaskStatus, CourierError> {
        self.store
            .get(task_id)
            .await?
            .map(|record| TaskStatus::from(&record))
            .ok_or(CourierError::TaskNotFound(task_id))
    }

    pub async fn counts(&self) -> Result<QueueCounts, CourierError> {
        self.store.counts().await
    }

    pub async fn next_due_at(&self) -> Result<Option<DateTime<Utc>>, CourierError> {
        self.store.next_due_at().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::QueueBuilder;
    use crate::impls::LocalTaskStore;
    use crate::ports::ManualClock;
    use crate::queue::TaskState;
    use crate::typed::Handler;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Serialize, Deserialize)]
    struct Flaky {
        fail_times: u32,
    }

    impl Task for Flaky {
        const TYPE: &'static str = "test.flaky.v1";
    }

    #[derive(Default)]
    struct FlakyHandler {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Handler<Flaky> for Arc<FlakyHandler> {
        async fn handle(&self, task: Flaky) -> Result<(), CourierError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= task.fail_times {
                return Err(CourierError::retriable(format!("call {call}")));
            }
            Ok(())
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn queue_with(clock: &ManualClock, handler: Arc<FlakyHandler>, max_attempts: u32) -> DelayedTaskQueue {
        QueueBuilder::new()
            .clock(Arc::new(clock.clone()))
            .store(Arc::new(LocalTaskStore::in_memory()))
            .max_attempts(max_attempts)
            .register::<Flaky, _>(handler)
            .unwrap()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn negative_delay_is_rejected() {
        let clock = ManualClock::new(start());
        let queue = queue_with(&clock, Arc::default(), 3);

        let err = queue
            .enqueue(&Flaky { fail_times: 0 }, TimeDelta::milliseconds(-1))
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::InvalidArgument(_)));
        assert_eq!(queue.counts().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn delay_past_the_calendar_is_rejected() {
        let clock = ManualClock::new(start());
        let queue = queue_with(&clock, Arc::default(), 3);

        for delay in [TimeDelta::MAX, TimeDelta::days(365 * 300_000)] {
            let err = queue
                .enqueue(&Flaky { fail_times: 0 }, delay)
                .await
                .unwrap_err();
            assert!(matches!(err, CourierError::InvalidArgument(_)), "{err}");
        }
        assert_eq!(queue.counts().await.unwrap().total(), 0);
    }

    /// Always asks for an absurd retry delay.
    struct FarFutureDecider;

    impl Decider for FarFutureDecider {
        fn decide(&self, _task: &TaskRecord, error: &CourierError) -> Decision {
            Decision::Retry {
                delay: TimeDelta::MAX,
                reason: error.to_string(),
            }
        }
    }

    #[tokio::test]
    async fn out_of_range_retry_delay_fails_the_task() {
        let clock = ManualClock::new(start());
        let queue = QueueBuilder::new()
            .clock(Arc::new(clock.clone()))
            .decider(Arc::new(FarFutureDecider))
            .register::<Flaky, _>(Arc::new(FlakyHandler::default()))
            .unwrap()
            .build()
            .unwrap();
        let id = queue
            .enqueue(&Flaky { fail_times: 1 }, TimeDelta::zero())
            .await
            .unwrap();

        let outcome = queue.poll_and_run("w").await.unwrap();
        assert!(matches!(outcome, PollOutcome::Failed { task_id, .. } if task_id == id));
        let status = queue.status(id).await.unwrap();
        assert_eq!(status.state, TaskState::Failed);
        assert!(status.last_error.unwrap().contains("out of range"));
    }

    #[tokio::test]
    async fn retries_with_backoff_then_completes() {
        let clock = ManualClock::new(start());
        let handler = Arc::new(FlakyHandler::default());
        let queue = queue_with(&clock, handler.clone(), 5);

        let id = queue
            .enqueue(&Flaky { fail_times: 1 }, TimeDelta::zero())
            .await
            .unwrap();

        let outcome = queue.poll_and_run("w").await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Retrying {
                task_id: id,
                not_before: start() + TimeDelta::seconds(2),
            }
        );

        clock.advance(TimeDelta::milliseconds(1999));
        assert!(queue.poll_and_run("w").await.unwrap().is_idle());

        clock.advance(TimeDelta::milliseconds(1));
        assert_eq!(queue.poll_and_run("w").await.unwrap(), PollOutcome::Completed(id));

        let status = queue.status(id).await.unwrap();
        assert_eq!(status.state, TaskState::Done);
        assert_eq!(status.attempts, 2);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_attempts_mark_failed() {
        let clock = ManualClock::new(start());
        let queue = queue_with(&clock, Arc::default(), 2);
        let id = queue
            .enqueue(&Flaky { fail_times: 10 }, TimeDelta::zero())
            .await
            .unwrap();

        assert!(matches!(queue.poll_and_run("w").await.unwrap(), PollOutcome::Retrying { .. }));
        clock.advance(TimeDelta::seconds(2));
        assert!(matches!(queue.poll_and_run("w").await.unwrap(), PollOutcome::Failed { .. }));

        let status = queue.status(id).await.unwrap();
        assert_eq!(status.state, TaskState::Failed);
        assert!(status.last_error.unwrap().contains("Max attempts"));
    }

    #[tokio::test]
    async fn unknown_task_type_fails_without_retry() {
        let clock = ManualClock::new(start());
        let queue = queue_with(&clock, Arc::default(), 5);
        let id = queue
            .enqueue_raw(TaskType::new("nobody.handles.this.v1"), b"{}".to_vec(), TimeDelta::zero())
            .await
            .unwrap();

        let outcome = queue.poll_and_run("w").await.unwrap();
        assert!(matches!(outcome, PollOutcome::Failed { task_id, .. } if task_id == id));
        assert_eq!(queue.status(id).await.unwrap().attempts, 1);
        assert!(queue.poll_and_run("w").await.unwrap().is_idle());
    }

    #[tokio::test]
    async fn undecodable_payload_fails_permanently() {
        let clock = ManualClock::new(start());
        let queue = queue_with(&clock, Arc::default(), 5);
        let id = queue
            .enqueue_raw(TaskType::new(Flaky::TYPE), b"nope".to_vec(), TimeDelta::zero())
            .await
            .unwrap();

        let outcome = queue.poll_and_run("w").await.unwrap();
        assert!(matches!(outcome, PollOutcome::Failed { .. }));
        let status = queue.status(id).await.unwrap();
        assert_eq!(status.state, TaskState::Failed);
        assert_eq!(status.attempts, 1);
        assert!(status.last_error.unwrap().contains(Flaky::TYPE));
    }

    #[tokio::test]
    async fn status_of_unknown_task_is_not_found() {
        let clock = ManualClock::new(start());
        let queue = queue_with(&clock, Arc::default(), 5);
        let missing = TaskId::from_ulid(ulid::Ulid::new());

        assert!(matches!(
            queue.status(missing).await,
            Err(CourierError::TaskNotFound(id)) if id == missing
        ));
    }

    #[test]
    fn heartbeat_is_a_third_of_the_lease() {
        let settings = QueueSettings {
            lease_ttl: TimeDelta::seconds(30),
            ..QueueSettings::default()
        };
        assert_eq!(settings.heartbeat_interval(), Duration::from_secs(10));
    }
}
