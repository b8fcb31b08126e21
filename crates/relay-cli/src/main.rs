use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use relay_core::RelayError;
use relay_core::app::{
    AppBuilder, ReaperLoop, StatusReader, TASK_QUEUE, TaskExecutionHandler, TaskProducer,
};
use relay_core::config::RelayConfig;
use relay_core::domain::{Operation, OwnerId, TaskId, WorkerIdentity};
use relay_core::impls::{InMemoryLedger, InMemoryTransport, JsonCodec};
use relay_core::ports::{CodecError, IdGenerator, OperationError, SystemClock, UlidGenerator};
use relay_core::router::{QueueConfig, QueueRouter};
use relay_core::typed::{Handler, RegistryContextFactory, TypedOperation, TypedRegistry};

#[derive(Debug, Serialize, Deserialize)]
struct Greet {
    name: String,
}

impl TypedOperation for Greet {
    const KIND: &'static str = "demo.greet.v1";
    type Output = String;
}

struct GreetHandler;

#[async_trait]
impl Handler<Greet> for GreetHandler {
    async fn handle(&self, worker: &WorkerIdentity, op: Greet) -> Result<String, OperationError> {
        Ok(format!("Hello, {}! (from {})", op.name, worker.name))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Divide {
    a: i64,
    b: i64,
}

impl TypedOperation for Divide {
    const KIND: &'static str = "demo.divide.v1";
    type Output = i64;
}

struct DivideHandler;

#[async_trait]
impl Handler<Divide> for DivideHandler {
    async fn handle(&self, _worker: &WorkerIdentity, op: Divide) -> Result<i64, OperationError> {
        op.a
            .checked_div(op.b)
            .ok_or_else(|| OperationError::failed(format!("cannot divide {} by {}", op.a, op.b)))
    }
}

fn operation<T: TypedOperation>(op: &T) -> Result<Operation, RelayError> {
    Operation::typed(op).map_err(|e| RelayError::from(CodecError::Encode(e.to_string())))
}

/// Wait for the reaper task. Returns `false` if it ended abnormally.
async fn join_reaper(reaper: Option<JoinHandle<()>>) -> bool {
    let Some(reaper) = reaper else {
        return true;
    };
    match reaper.await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "reaper task failed");
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RelayConfig::from_env()?;
    info!(?config, "configuration loaded");

    // (A) transport / ledger / operation registry を用意
    let transport = InMemoryTransport::new().with_poll_interval(config.client.poll_interval);
    let ledger = InMemoryLedger::new();

    let mut registry = TypedRegistry::new();
    registry.register::<Greet, _>(GreetHandler)?;
    registry.register::<Divide, _>(DivideHandler)?;

    let handler = TaskExecutionHandler::new(
        Arc::new(ledger.clone()),
        Arc::new(JsonCodec),
        Arc::new(RegistryContextFactory::new(Arc::new(registry))),
    )
    .with_lease_ttl(config.worker.lease_ttl);

    // (B) worker pool を起動（slot 数ぶん competing subscriber）
    let router = QueueRouter::new(QueueConfig::new(config.client.clone(), Arc::new(transport)))?;
    let app = AppBuilder::new(router)
        .register(Arc::new(handler))?
        .slots(TASK_QUEUE, config.worker.slots)
        .expect_queues(&[TASK_QUEUE])
        .build()?;
    app.start().await?;

    let (reaper_tx, reaper_rx) = watch::channel(false);
    let reaper = config.worker.lease_ttl.map(|_| {
        let reaper = ReaperLoop::new(
            Arc::new(ledger.clone()),
            Arc::new(SystemClock),
            config.worker.reap_interval,
        );
        tokio::spawn(async move { reaper.run(reaper_rx).await })
    });

    // (C) タスク投入（fire-and-forget）
    let ids = Arc::new(UlidGenerator::new(SystemClock));
    let producer = TaskProducer::new(
        app.router().publisher().await?,
        Arc::new(JsonCodec),
        ids.clone(),
        TASK_QUEUE,
    );
    let owner = OwnerId::new("demo-owner");
    let worker = WorkerIdentity::new(ids.generate_worker_id(), "demo-worker", owner.clone());

    let submitted: Vec<TaskId> = vec![
        producer
            .submit(operation(&Greet { name: "relay".to_string() })?, worker.clone())
            .await?,
        producer
            .submit(operation(&Divide { a: 84, b: 2 })?, worker.clone())
            .await?,
        producer
            .submit(operation(&Divide { a: 1, b: 0 })?, worker)
            .await?,
    ];
    for task_id in &submitted {
        println!("submitted task: {task_id}");
    }

    // (D) ledger をポーリングして結果を待つ
    let reader = StatusReader::new(Arc::new(ledger.clone()));
    for task_id in submitted {
        loop {
            let view = reader.status(&owner, task_id).await?;
            if view.resolved {
                println!(
                    "final status: task={} status={} result={} failure={:?}",
                    view.task_id,
                    view.status,
                    view.result.unwrap_or(serde_json::Value::Null),
                    view.failure.map(|f| f.message),
                );
                break;
            }
            sleep(Duration::from_millis(50)).await;
        }
    }

    // (E) 停止（実行中のタスクは打ち切る）
    reaper_tx.send_replace(true);
    join_reaper(reaper).await;
    app.shutdown().await?;
    Ok(())
}
