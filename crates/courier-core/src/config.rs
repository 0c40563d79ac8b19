//! Courier configuration.
//!
//! 読み込み順（後勝ち）:
//! 1. `config/default.toml`
//! 2. `config/{COURIER_ENV}.toml`（既定 `development`）
//! 3. `COURIER__` で始まる環境変数（例: `COURIER__QUEUE__WORKERS=4`）
//!
//! どのファイルも任意。全フィールドに既定値がある。

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;

use crate::queue::RetryPolicy;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub queue: QueueConfig,
    pub broadcast: BroadcastConfig,
    pub chat: ChatConfig,
}

/// DelayedTaskQueue settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Directory for `tasks.jsonl`. In-memory store when absent.
    pub data_dir: Option<PathBuf>,
    pub workers: usize,
    pub max_attempts: u32,
    pub lease_ttl_ms: u64,
    pub poll_interval_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_multiplier: f64,
    /// How long Done/Failed tasks are kept before GC.
    pub retention_secs: u64,
    pub gc_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            workers: 2,
            max_attempts: 5,
            lease_ttl_ms: 30_000,
            poll_interval_ms: 100,
            backoff_base_ms: 2_000,
            backoff_multiplier: 2.0,
            retention_secs: 86_400,
            gc_interval_secs: 60,
        }
    }
}

impl QueueConfig {
    pub fn lease_ttl(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.lease_ttl_ms as i64)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retention(&self) -> TimeDelta {
        TimeDelta::seconds(self.retention_secs as i64)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.backoff_base_ms),
            self.backoff_multiplier,
        )
    }

    pub fn journal_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("tasks.jsonl"))
    }
}

/// What to do when a subscriber's buffer is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest buffered event and count it as dropped.
    #[default]
    DropOldest,
    /// Close and remove the subscription.
    Disconnect,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub buffer_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 256,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Number of messages returned by `recent_messages`.
    pub history_limit: usize,
    /// Directory for `messages.jsonl`. In-memory store when absent.
    pub data_dir: Option<PathBuf>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: 50,
            data_dir: None,
        }
    }
}

impl ChatConfig {
    pub fn journal_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("messages.jsonl"))
    }
}

impl CourierConfig {
    /// Load configuration from files and environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("COURIER_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("COURIER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file (plus environment overrides).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("COURIER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
