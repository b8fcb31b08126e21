//! TaskExecutionHandler - task queue のメッセージを実行して ledger に記録する
//!
//! # フロー
//! 1. bytes を `TaskDescriptor` にデコード
//! 2. `WorkerIdentity` から WorkerContext を組み立てる
//! 3. ledger partition を開き、`PROCESSING` を書く（実行前）
//! 4. operation を実行（subscriber のループはここで待つ。ループが止まると operation も abort）
//! 5. `COMPLETED` または `ERRORED` で上書き
//! 6. partition を閉じる（すべての終了経路で）
//!
//! # 失敗の扱い
//! - デコード失敗・コンテキスト構築失敗: そのメッセージだけ捨てる（warn を出して `Ok`）
//! - operation の失敗・panic: `ERRORED` として記録（subscriber には伝えない）
//! - ledger の失敗: `HandlerError::Ledger` として subscriber へ伝播
//! - lease 期限が計算できない TTL: `HandlerError::Other` として subscriber へ伝播
//!
//! リトライはしません。`ERRORED` を見た呼び出し側が再投入します。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, warn};

use crate::config::ConfigError;
use crate::domain::{FailureKind, Operation, Status, TaskFailure, TaskRecord};
use crate::ports::{
    Clock, CodecError, ContextError, HandlerError, LedgerError, LedgerPartition, MessageHandler,
    SystemClock, TaskCodec, TaskLedger, WorkerContext, WorkerContextFactory,
};

/// Queue the task executor is bound to unless configured otherwise.
pub const TASK_QUEUE: &str = "task_call";

/// Per-message outcome classification.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("undecodable task message: {0}")]
    Decode(#[from] CodecError),

    #[error("cannot build worker context: {0}")]
    Context(#[from] ContextError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("cannot stamp lease: {0}")]
    Lease(#[from] ConfigError),
}

pub struct TaskExecutionHandler {
    queue: String,
    ledger: Arc<dyn TaskLedger>,
    codec: Arc<dyn TaskCodec>,
    contexts: Arc<dyn WorkerContextFactory>,
    clock: Arc<dyn Clock>,
    lease_ttl: Option<Duration>,
}

impl TaskExecutionHandler {
    pub fn new(
        ledger: Arc<dyn TaskLedger>,
        codec: Arc<dyn TaskCodec>,
        contexts: Arc<dyn WorkerContextFactory>,
    ) -> Self {
        Self {
            queue: TASK_QUEUE.to_string(),
            ledger,
            codec,
            contexts,
            clock: Arc::new(SystemClock),
            lease_ttl: None,
        }
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Stamp `PROCESSING` records with `now + ttl` so the reaper can expire them.
    pub fn with_lease_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// Process one message and return the terminal status that was recorded.
    pub async fn dispatch(&self, message: &[u8]) -> Result<Status, DispatchError> {
        let descriptor = self.codec.decode(message)?;
        let context = self.contexts.build(descriptor.worker())?;

        let key = descriptor.ledger_key();
        let worker_id = descriptor.worker().worker_id;
        let (_, operation, _) = descriptor.into_parts();

        let started = self.clock.now();
        let processing =
            TaskRecord::processing(&key, worker_id, started, self.lease_deadline(started)?);

        let partition = self.ledger.partition().await?;
        let outcome = self
            .record_execution(partition.as_ref(), processing, context, operation)
            .await;
        let closed = partition.close().await;

        let status = outcome?;
        closed?;
        Ok(status)
    }

    async fn record_execution(
        &self,
        partition: &dyn LedgerPartition,
        processing: TaskRecord,
        context: Arc<dyn WorkerContext>,
        operation: Operation,
    ) -> Result<Status, LedgerError> {
        let key = &processing.key();
        let worker_id = context.identity().worker_id;
        partition.set(processing).await?;
        debug!(task_id = %key.task_id, owner = %key.owner, kind = %operation.kind, "processing");

        let record = match run_operation(context, operation).await {
            Ok(value) => TaskRecord::completed(key, worker_id, value, self.clock.now()),
            Err(failure) => {
                info!(
                    task_id = %key.task_id,
                    owner = %key.owner,
                    kind = ?failure.kind,
                    error = %failure.message,
                    "task errored"
                );
                TaskRecord::errored(key, Some(worker_id), failure, self.clock.now())
            }
        };

        let status = record.status;
        partition.set(record).await?;
        debug!(task_id = %key.task_id, status = %status, "resolved");
        Ok(status)
    }

    fn lease_deadline(
        &self,
        started: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ConfigError> {
        let Some(ttl) = self.lease_ttl else {
            return Ok(None);
        };
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|delta| started.checked_add_signed(delta))
            .map(Some)
            .ok_or_else(|| ConfigError::Invalid {
                key: "lease_ttl".to_string(),
                value: format!("{}s", ttl.as_secs()),
                reason: format!("deadline overflows when added to {started}"),
            })
    }
}

/// Run the operation on its own task so a panic becomes a failure instead of
/// unwinding through the subscriber loop.
///
/// The task is aborted when this future is dropped, so closing the subscriber
/// stops the operation instead of leaving it running detached.
async fn run_operation(
    context: Arc<dyn WorkerContext>,
    operation: Operation,
) -> Result<serde_json::Value, TaskFailure> {
    let task = AbortOnDropHandle::new(tokio::spawn(async move {
        context.execute(operation).await
    }));
    let joined = task.await;
    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TaskFailure::new(FailureKind::Operation, e.to_string())),
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "operation panicked".to_string());
            Err(TaskFailure::new(FailureKind::Panicked, message))
        }
        Err(e) => Err(TaskFailure::new(FailureKind::Operation, e.to_string())),
    }
}

#[async_trait]
impl MessageHandler for TaskExecutionHandler {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn handle(&self, message: &[u8]) -> Result<(), HandlerError> {
        match self.dispatch(message).await {
            Ok(_) => Ok(()),
            Err(DispatchError::Ledger(e)) => {
                error!(queue = %self.queue, error = %e, "ledger write failed");
                Err(HandlerError::Ledger(e))
            }
            // 設定の問題なので以降のメッセージもすべて失敗する
            Err(DispatchError::Lease(e)) => {
                error!(queue = %self.queue, error = %e, "lease misconfigured");
                Err(HandlerError::Other(e.to_string()))
            }
            Err(e) => {
                warn!(queue = %self.queue, error = %e, "message dropped");
                Ok(())
            }
        }
    }
}
