use serde::{Deserialize, Serialize};

use super::identity::WorkerIdentity;
use super::ids::TaskId;
use super::operation::Operation;
use super::record::LedgerKey;

/// TaskId + Operation + WorkerIdentity の“運搬用”データ。
///
/// Producers encode this onto a queue; it is never mutated after publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    task_id: TaskId,
    operation: Operation,
    worker: WorkerIdentity,
}

impl TaskDescriptor {
    pub fn new(task_id: TaskId, operation: Operation, worker: WorkerIdentity) -> Self {
        Self {
            task_id,
            operation,
            worker,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn worker(&self) -> &WorkerIdentity {
        &self.worker
    }

    /// The ledger key every record for this task is written under.
    pub fn ledger_key(&self) -> LedgerKey {
        LedgerKey::new(self.worker.owner.clone(), self.task_id)
    }

    pub fn into_parts(self) -> (TaskId, Operation, WorkerIdentity) {
        (self.task_id, self.operation, self.worker)
    }
}
