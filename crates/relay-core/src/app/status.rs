//! Status - ledger をポーリングしてタスクの状態を返す
//!
//! handler が最初の `PROCESSING` を書くまで ledger にはレコードがありません。
//! その間は `SUBMITTED` として扱います。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{LedgerKey, OwnerId, Status, TaskFailure, TaskId, TaskRecord, WorkerId};
use crate::ports::{LedgerError, TaskLedger};

/// What a polling caller sees for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusView {
    pub owner_id: OwnerId,
    pub task_id: TaskId,
    pub status: Status,
    pub resolved: bool,
    pub result: Option<serde_json::Value>,
    pub failure: Option<TaskFailure>,
    pub worker_id: Option<WorkerId>,
    /// `None` while no record exists yet.
    pub updated_at: Option<DateTime<Utc>>,
}

impl TaskStatusView {
    fn submitted(key: LedgerKey) -> Self {
        Self {
            owner_id: key.owner,
            task_id: key.task_id,
            status: Status::Submitted,
            resolved: false,
            result: None,
            failure: None,
            worker_id: None,
            updated_at: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }
}

impl From<TaskRecord> for TaskStatusView {
    fn from(record: TaskRecord) -> Self {
        Self {
            owner_id: record.owner_id,
            task_id: record.task_id,
            status: record.status,
            resolved: record.resolved,
            result: record.result,
            failure: record.failure,
            worker_id: record.worker_id,
            updated_at: Some(record.updated_at),
        }
    }
}

pub struct StatusReader {
    ledger: Arc<dyn TaskLedger>,
}

impl StatusReader {
    pub fn new(ledger: Arc<dyn TaskLedger>) -> Self {
        Self { ledger }
    }

    pub async fn status(
        &self,
        owner: &OwnerId,
        task_id: TaskId,
    ) -> Result<TaskStatusView, LedgerError> {
        let key = LedgerKey::new(owner.clone(), task_id);
        let partition = self.ledger.partition().await?;
        let found = partition.get(&key).await;
        let closed = partition.close().await;

        let view = match found? {
            Some(record) => TaskStatusView::from(record),
            None => TaskStatusView::submitted(key),
        };
        closed?;
        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FailureKind;
    use crate::impls::InMemoryLedger;

    #[tokio::test]
    async fn missing_record_reads_as_submitted() {
        let ledger = InMemoryLedger::new();
        let reader = StatusReader::new(Arc::new(ledger.clone()));
        let owner = OwnerId::from("owner-a");
        let task_id = TaskId::generate();

        let view = reader.status(&owner, task_id).await.unwrap();
        assert_eq!(view.status, Status::Submitted);
        assert!(!view.is_resolved());
        assert!(view.updated_at.is_none());
        assert_eq!(view.task_id, task_id);
        assert_eq!(ledger.open_partitions(), 0);
    }

    #[tokio::test]
    async fn reads_the_stored_record() {
        let ledger = InMemoryLedger::new();
        let owner = OwnerId::from("owner-a");
        let key = LedgerKey::new(owner.clone(), TaskId::generate());
        let partition = ledger.partition().await.unwrap();
        partition
            .set(TaskRecord::errored(
                &key,
                None,
                TaskFailure::new(FailureKind::Operation, "boom"),
                Utc::now(),
            ))
            .await
            .unwrap();
        partition.close().await.unwrap();

        let view = StatusReader::new(Arc::new(ledger))
            .status(&owner, key.task_id)
            .await
            .unwrap();
        assert_eq!(view.status, Status::Errored);
        assert!(view.resolved);
        assert!(view.result.is_none());
        assert_eq!(view.failure.unwrap().message, "boom");
    }

    #[tokio::test]
    async fn other_owners_records_are_not_visible() {
        let ledger = InMemoryLedger::new();
        let key = LedgerKey::new(OwnerId::from("owner-a"), TaskId::generate());
        let partition = ledger.partition().await.unwrap();
        partition
            .set(TaskRecord::processing(&key, WorkerId::generate(), Utc::now(), None))
            .await
            .unwrap();
        partition.close().await.unwrap();

        let view = StatusReader::new(Arc::new(ledger))
            .status(&OwnerId::from("owner-b"), key.task_id)
            .await
            .unwrap();
        assert_eq!(view.status, Status::Submitted);
    }
}
