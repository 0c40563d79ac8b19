//! courier CLI: runs the delayed queue and the chat broadcaster locally.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use courier_core::app::{ChatService, DelayedTaskQueue, GcLoop, QueueBuilder, QueueCounts, WorkerPool};
use courier_core::broadcast::{Broadcaster, DeliveryOptions, spawn_delivery};
use courier_core::config::{ChatConfig, CourierConfig, QueueConfig};
use courier_core::domain::{Author, ChatEvent};
use courier_core::impls::{LocalMessageStore, LocalTaskStore};
use courier_core::jobs::{LogRequestHandler, RequestLog, dispatch_request_log};
use courier_core::ports::{Clock, EventSink, MessageStore, SendStatus, SystemClock, TaskStore};
use courier_core::typed::Task;

#[derive(Debug, Parser)]
#[command(name = "courier", version, about = "Delayed tasks and chat fan-out")]
struct Cli {
    /// Config file (default: config/default.toml + config/$COURIER_ENV.toml)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Dispatch request-log jobs and run workers until they are all done.
    QueueDemo {
        /// Number of simulated requests.
        #[arg(long, default_value_t = 3)]
        requests: usize,
    },
    /// Post and delete a few chat messages with a stdout subscriber attached.
    ChatDemo,
    /// Print task counts of the configured task store.
    Counts,
}

/// Writes every event as one JSON line on stdout.
struct StdoutSink;

impl EventSink for StdoutSink {
    fn try_send(&self, event: &ChatEvent) -> SendStatus {
        match serde_json::to_string(event) {
            Ok(line) => {
                println!("{line}");
                SendStatus::Sent
            }
            Err(e) => {
                warn!(error = %e, "event not serializable");
                SendStatus::Closed
            }
        }
    }
}

/// Waits for Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

async fn open_task_store(config: &QueueConfig, clock: &dyn Clock) -> anyhow::Result<Arc<dyn TaskStore>> {
    Ok(match config.journal_path() {
        Some(path) => Arc::new(
            LocalTaskStore::open(&path, clock.now())
                .await
                .with_context(|| format!("opening task journal {}", path.display()))?,
        ),
        None => Arc::new(LocalTaskStore::in_memory()),
    })
}

async fn open_message_store(config: &ChatConfig) -> anyhow::Result<Arc<dyn MessageStore>> {
    Ok(match config.journal_path() {
        Some(path) => Arc::new(
            LocalMessageStore::open(&path)
                .await
                .with_context(|| format!("opening message journal {}", path.display()))?,
        ),
        None => Arc::new(LocalMessageStore::in_memory()),
    })
}

async fn queue_demo(config: &CourierConfig, requests: usize) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_task_store(&config.queue, clock.as_ref()).await?;

    let queue: Arc<DelayedTaskQueue> = Arc::new(
        QueueBuilder::from_config(&config.queue)
            .clock(Arc::clone(&clock))
            .store(Arc::clone(&store))
            .register::<RequestLog, _>(LogRequestHandler::new(Arc::clone(&clock)))?
            .expect_tasks(&[RequestLog::TYPE])
            .build()?,
    );

    for i in 0..requests {
        let receipt = dispatch_request_log(
            &queue,
            RequestLog {
                method: "GET".to_string(),
                url: format!("http://localhost/api/queue-test?n={i}"),
                ip: Some("127.0.0.1".to_string()),
                user_agent: Some("courier-cli".to_string()),
                payload: serde_json::json!({ "n": i }),
            },
        )
        .await?;
        println!("{}", serde_json::to_string(&receipt)?);
    }

    let pool = WorkerPool::spawn(config.queue.workers, Arc::clone(&queue));
    let gc = GcLoop::from_config(Arc::clone(&store), Arc::clone(&clock), &config.queue)
        .spawn(pool.shutdown_signal());

    let wait_for_drain = async {
        loop {
            let counts = queue.counts().await?;
            if counts.pending == 0 && counts.running == 0 {
                return anyhow::Ok(counts);
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    };

    tokio::select! {
        counts = wait_for_drain => {
            let counts = counts?;
            info!(done = counts.done, failed = counts.failed, "queue drained");
            println!("{}", serde_json::to_string(&counts)?);
        }
        _ = shutdown_signal() => info!("interrupted"),
    }

    pool.shutdown_and_join().await;
    let _ = gc.await;
    Ok(())
}

async fn chat_demo(config: &CourierConfig) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_message_store(&config.chat).await?;
    let broadcaster = Broadcaster::new(config.broadcast.clone());
    let chat = ChatService::new(store, broadcaster.clone(), clock, &config.chat);

    let delivery = spawn_delivery(
        broadcaster.subscribe(),
        Arc::new(StdoutSink),
        DeliveryOptions::default(),
    );

    let alice = Author::new(1, "alice");
    let bob = Author::new(2, "bob");

    let hello = chat.post_message(&alice, "hello from alice").await?;
    chat.post_message(&bob, "  hi alice  ").await?;

    if let Err(e) = chat.post_message(&bob, "   ").await {
        info!(error = %e, "empty message rejected");
    }
    if let Err(e) = chat.delete_message(&bob, hello.id).await {
        info!(error = %e, "foreign delete rejected");
    }
    chat.delete_message(&alice, hello.id).await?;

    for view in chat.recent_messages().await? {
        info!(id = %view.id, user = %view.user, message = %view.message, "history");
    }

    // 配信タスクが追いつくのを待ってから購読を外す
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(chat);
    drop(broadcaster);
    let _ = delivery.await;
    Ok(())
}

/// Read-only: the journal may belong to a running `queue-demo`.
async fn counts(config: &CourierConfig) -> anyhow::Result<()> {
    let counts = match config.queue.journal_path() {
        Some(path) => LocalTaskStore::snapshot_counts(&path)
            .await
            .with_context(|| format!("reading task journal {}", path.display()))?,
        None => QueueCounts::default(),
    };
    println!("{}", serde_json::to_string(&counts)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=info,courier_core=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => CourierConfig::from_file(path)?,
        None => CourierConfig::load()?,
    };

    match cli.command {
        Command::QueueDemo { requests } => queue_demo(&config, requests).await,
        Command::ChatDemo => chat_demo(&config).await,
        Command::Counts => counts(&config).await,
    }
}
