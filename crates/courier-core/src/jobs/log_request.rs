//! Request-log job: records an incoming request a moment after it was served.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::DelayedTaskQueue;
use crate::domain::{CourierError, TaskId};
use crate::ports::Clock;
use crate::typed::{Handler, Task};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Delay applied by [`dispatch_request_log`].
pub fn dispatch_delay() -> TimeDelta {
    TimeDelta::seconds(1)
}

/// What the caller knows about the request being logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLog {
    pub method: String,
    pub url: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    /// Request body / query parameters, as received.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Task for RequestLog {
    const TYPE: &'static str = "courier.request.log.v1";
}

pub struct LogRequestHandler {
    clock: Arc<dyn Clock>,
}

impl LogRequestHandler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl Handler<RequestLog> for LogRequestHandler {
    async fn handle(&self, task: RequestLog) -> Result<(), CourierError> {
        let request_data = serde_json::to_string(&task)?;
        let executed_at = self.clock.now().format(DATETIME_FORMAT).to_string();
        info!(request_data = %request_data, executed_at = %executed_at, "Job executed: log_request");
        Ok(())
    }
}

/// Returned to the caller right after dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReceipt {
    pub message: String,
    pub data: RequestLog,
    pub queued_at: String,
    pub task_id: TaskId,
}

/// Enqueue a [`RequestLog`] to run one second from now.
pub async fn dispatch_request_log(
    queue: &DelayedTaskQueue,
    data: RequestLog,
) -> Result<DispatchReceipt, CourierError> {
    let task_id = queue.enqueue(&data, dispatch_delay()).await?;
    let queued_at: DateTime<Utc> = queue.clock().now();
    Ok(DispatchReceipt {
        message: "Job dispatched successfully".to_string(),
        data,
        queued_at: queued_at.format(DATETIME_FORMAT).to_string(),
        task_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{PollOutcome, QueueBuilder};
    use crate::ports::ManualClock;
    use crate::queue::TaskState;
    use chrono::TimeZone;

    fn sample() -> RequestLog {
        RequestLog {
            method: "GET".into(),
            url: "http://localhost/api/queue-test?x=1".into(),
            ip: Some("127.0.0.1".into()),
            user_agent: Some("curl/8.0".into()),
            payload: serde_json::json!({ "x": "1" }),
        }
    }

    #[tokio::test]
    async fn dispatch_delays_by_one_second() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let clock = ManualClock::new(start);
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let queue = QueueBuilder::new()
            .clock(Arc::clone(&shared))
            .register::<RequestLog, _>(LogRequestHandler::new(shared))
            .unwrap()
            .expect_tasks(&[RequestLog::TYPE])
            .build()
            .unwrap();

        let receipt = dispatch_request_log(&queue, sample()).await.unwrap();
        assert_eq!(receipt.message, "Job dispatched successfully");
        assert_eq!(receipt.queued_at, "2024-03-01 09:30:00");
        assert_eq!(receipt.data.method, "GET");

        let status = queue.status(receipt.task_id).await.unwrap();
        assert_eq!(status.not_before, start + TimeDelta::seconds(1));

        assert!(queue.poll_and_run("w").await.unwrap().is_idle());
        clock.advance(TimeDelta::seconds(1));
        assert_eq!(
            queue.poll_and_run("w").await.unwrap(),
            PollOutcome::Completed(receipt.task_id)
        );
        assert_eq!(queue.status(receipt.task_id).await.unwrap().state, TaskState::Done);
    }

    #[test]
    fn receipt_serializes_with_request_fields() {
        let receipt = DispatchReceipt {
            message: "Job dispatched successfully".into(),
            data: sample(),
            queued_at: "2024-03-01 09:30:00".into(),
            task_id: TaskId::from_ulid(ulid::Ulid::new()),
        };
        let v = serde_json::to_value(&receipt).unwrap();
        assert_eq!(v["data"]["user_agent"], "curl/8.0");
        assert_eq!(v["data"]["payload"]["x"], "1");
        assert!(v["task_id"].is_string());
    }
}
