//! TaskProducer - タスクを採番・エンコードして queue に publish する
//!
//! publish は fire-and-forget です。タスクの結果は ledger をポーリングして確認します
//! （`StatusReader`）。

use std::sync::Arc;

use tracing::debug;

use crate::domain::{Operation, TaskDescriptor, TaskId, WorkerIdentity};
use crate::ports::{CodecError, IdGenerator, Publisher, TaskCodec, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub struct TaskProducer {
    publisher: Arc<dyn Publisher>,
    codec: Arc<dyn TaskCodec>,
    ids: Arc<dyn IdGenerator>,
    queue: String,
}

impl TaskProducer {
    /// `publisher` may come from a router (`QueueRouter::publisher`) or be built
    /// directly from a transport factory by a process that never runs a router.
    pub fn new(
        publisher: Arc<dyn Publisher>,
        codec: Arc<dyn TaskCodec>,
        ids: Arc<dyn IdGenerator>,
        queue: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            codec,
            ids,
            queue: queue.into(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Submit under a freshly generated task id.
    pub async fn submit(
        &self,
        operation: Operation,
        worker: WorkerIdentity,
    ) -> Result<TaskId, ProducerError> {
        let task_id = self.ids.generate_task_id();
        self.submit_with_id(task_id, operation, worker).await?;
        Ok(task_id)
    }

    /// Submit under a caller-chosen id. Reusing an id overwrites that task's record.
    pub async fn submit_with_id(
        &self,
        task_id: TaskId,
        operation: Operation,
        worker: WorkerIdentity,
    ) -> Result<(), ProducerError> {
        let descriptor = TaskDescriptor::new(task_id, operation, worker);
        let bytes = self.codec.encode(&descriptor)?;
        debug!(queue = %self.queue, task_id = %task_id, kind = %descriptor.operation().kind, "submit");
        self.publisher.publish(&self.queue, bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OwnerId, WorkerId};
    use crate::impls::JsonCodec;
    use crate::ports::{SystemClock, UlidGenerator};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingPublisher {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
        closed: bool,
    }

    #[async_trait]
    impl Publisher for CapturingPublisher {
        async fn publish(&self, queue: &str, message: Vec<u8>) -> Result<(), TransportError> {
            if self.closed {
                return Err(TransportError::Closed);
            }
            self.sent.lock().unwrap().push((queue.to_string(), message));
            Ok(())
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn worker() -> WorkerIdentity {
        WorkerIdentity::new(WorkerId::generate(), "w1", OwnerId::from("owner-a"))
    }

    fn producer(publisher: Arc<CapturingPublisher>) -> TaskProducer {
        TaskProducer::new(
            publisher,
            Arc::new(JsonCodec),
            Arc::new(UlidGenerator::new(SystemClock)),
            "task_call",
        )
    }

    #[tokio::test]
    async fn submit_publishes_an_encoded_descriptor() {
        let publisher = Arc::new(CapturingPublisher::default());
        let producer = producer(Arc::clone(&publisher));
        let operation = Operation::new("math.add.v1", json!({ "a": 1, "b": 2 }));

        let task_id = producer.submit(operation.clone(), worker()).await.unwrap();

        let sent = publisher.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "task_call");
        let decoded = JsonCodec.decode(&sent[0].1).unwrap();
        assert_eq!(decoded.task_id(), task_id);
        assert_eq!(decoded.operation(), &operation);
    }

    #[tokio::test]
    async fn submit_generates_distinct_ids() {
        let producer = producer(Arc::new(CapturingPublisher::default()));
        let op = Operation::new("noop.v1", json!(null));
        let a = producer.submit(op.clone(), worker()).await.unwrap();
        let b = producer.submit(op, worker()).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn transport_errors_surface() {
        let producer = producer(Arc::new(CapturingPublisher {
            closed: true,
            ..CapturingPublisher::default()
        }));
        let err = producer
            .submit(Operation::new("noop.v1", json!(null)), worker())
            .await
            .unwrap_err();
        assert!(matches!(err, ProducerError::Transport(TransportError::Closed)));
    }
}
