//! QueueBuilder - DelayedTaskQueue の構築とワイヤリング
//!
//! 設定の不足や handler の登録漏れは build() で弾き、
//! ワーカーが走り出してから UnknownTaskType で気づくことがないようにする。

use std::sync::Arc;

use super::runtime::{DelayedTaskQueue, QueueSettings};
use crate::config::QueueConfig;
use crate::domain::{Decider, DefaultDecider};
use crate::impls::LocalTaskStore;
use crate::ports::{Clock, IdGenerator, SystemClock, TaskStore, UlidGenerator};
use crate::typed::{Handler, RegistryError, Task, TypedRegistry};

/// Assembles a [`DelayedTaskQueue`].
///
/// ```ignore
/// let queue = QueueBuilder::from_config(&config.queue)
///     .store(Arc::new(store))
///     .register::<MyTask, _>(MyTaskHandler)?
///     .expect_tasks(&["my_namespace.my_task.v1"])
///     .build()?;
/// ```
///
/// 指定しなかった部品の既定値:
/// store = in-memory LocalTaskStore, clock = SystemClock,
/// ids = clock を使う UlidGenerator, decider = config の backoff を使う DefaultDecider
pub struct QueueBuilder {
    registry: TypedRegistry,
    expected_tasks: Option<Vec<String>>,
    config: QueueConfig,
    store: Option<Arc<dyn TaskStore>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    decider: Option<Arc<dyn Decider>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("expected task types have no handler: {0:?}")]
    MissingTaskTypes(Vec<String>),

    #[error("invalid queue settings: {0}")]
    InvalidSettings(String),
}

impl QueueBuilder {
    pub fn new() -> Self {
        Self::from_config(&QueueConfig::default())
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            registry: TypedRegistry::new(),
            expected_tasks: None,
            config: config.clone(),
            store: None,
            clock: None,
            ids: None,
            decider: None,
        }
    }

    /// Handler を登録
    pub fn register<T: Task, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    /// 期待される task_type のリストを設定
    pub fn expect_tasks(mut self, task_types: &[&str]) -> Self {
        self.expected_tasks = Some(task_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.max_attempts = max_attempts;
        self
    }

    pub fn lease_ttl_ms(mut self, lease_ttl_ms: u64) -> Self {
        self.config.lease_ttl_ms = lease_ttl_ms;
        self
    }

    /// # 検証
    /// - expect_tasks() で設定された task_type が全て登録されているか
    /// - workers / max_attempts / lease_ttl が 0 でないか
    pub fn build(self) -> Result<DelayedTaskQueue, BuildError> {
        if let Some(expected_tasks) = &self.expected_tasks {
            let missing = self.registry.missing(expected_tasks.iter().map(String::as_str));
            if !missing.is_empty() {
                return Err(BuildError::MissingTaskTypes(missing));
            }
        }
        if self.config.workers == 0 {
            return Err(BuildError::InvalidSettings("workers must be at least 1".into()));
        }
        if self.config.max_attempts == 0 {
            return Err(BuildError::InvalidSettings("max_attempts must be at least 1".into()));
        }
        if self.config.lease_ttl_ms == 0 {
            return Err(BuildError::InvalidSettings("lease_ttl_ms must be positive".into()));
        }

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(LocalTaskStore::in_memory()));
        let decider = self
            .decider
            .unwrap_or_else(|| Arc::new(DefaultDecider::new(self.config.retry_policy())));

        Ok(DelayedTaskQueue::new(
            store,
            clock,
            ids,
            self.registry,
            decider,
            QueueSettings::from_config(&self.config),
        ))
    }
}

impl Default for QueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::handler::tests::{CounterHandler, CounterTask, LabelTask};

    #[test]
    fn builds_when_expected_types_are_registered() {
        let queue = QueueBuilder::new()
            .register::<CounterTask, _>(CounterHandler)
            .unwrap()
            .expect_tasks(&[CounterTask::TYPE])
            .build();
        assert!(queue.is_ok());
    }

    #[test]
    fn missing_expected_type_fails_fast() {
        let queue = QueueBuilder::new()
            .register::<CounterTask, _>(CounterHandler)
            .unwrap()
            .expect_tasks(&[CounterTask::TYPE, LabelTask::TYPE])
            .build();
        assert!(matches!(
            queue,
            Err(BuildError::MissingTaskTypes(missing)) if missing == vec![LabelTask::TYPE.to_string()]
        ));
    }

    #[test]
    fn expectations_are_optional() {
        let queue = QueueBuilder::new()
            .register::<CounterTask, _>(CounterHandler)
            .unwrap()
            .build();
        assert!(queue.is_ok());
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let queue = QueueBuilder::new().max_attempts(0).build();
        assert!(matches!(queue, Err(BuildError::InvalidSettings(_))));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let config = QueueConfig {
            workers: 0,
            ..QueueConfig::default()
        };
        let queue = QueueBuilder::from_config(&config).build();
        assert!(matches!(queue, Err(BuildError::InvalidSettings(msg)) if msg.contains("workers")));
    }

    #[test]
    fn settings_follow_config() {
        let config = QueueConfig {
            max_attempts: 7,
            lease_ttl_ms: 9_000,
            ..QueueConfig::default()
        };
        let queue = QueueBuilder::from_config(&config).build().unwrap();
        assert_eq!(queue.settings().max_attempts, 7);
        assert_eq!(queue.settings().heartbeat_interval().as_millis(), 3_000);
    }
}
