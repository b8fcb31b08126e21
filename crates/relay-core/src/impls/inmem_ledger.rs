//! In-memory ledger implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::trace;

use crate::domain::{LedgerKey, TaskRecord};
use crate::ports::{LedgerError, LedgerPartition, TaskLedger};

/// Shared ledger state.
#[derive(Default)]
struct LedgerState {
    /// All task records (single source of truth).
    records: Mutex<HashMap<LedgerKey, TaskRecord>>,

    /// Partition handles currently open.
    open: AtomicUsize,

    /// Partition handles ever opened.
    opened_total: AtomicUsize,

    /// No new partitions once set.
    closed: AtomicBool,

    /// Fault injection: every `set` fails while this is on.
    fail_writes: AtomicBool,
}

/// In-memory `TaskLedger`.
///
/// Clones share the same records, so a test can hand one clone to the worker
/// and inspect the other.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &LedgerKey) -> Option<TaskRecord> {
        self.state.records.lock().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Partition handles not yet closed. Zero once every handler invocation has finished.
    pub fn open_partitions(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    pub fn opened_partitions(&self) -> usize {
        self.state.opened_total.load(Ordering::SeqCst)
    }

    /// Make every subsequent write fail with `WriteFailed`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Refuse new partitions. Handles already open keep working.
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskLedger for InMemoryLedger {
    async fn partition(&self) -> Result<Box<dyn LedgerPartition>, LedgerError> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("ledger closed".to_string()));
        }
        self.state.open.fetch_add(1, Ordering::SeqCst);
        self.state.opened_total.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryPartition {
            state: Arc::clone(&self.state),
            released: AtomicBool::new(false),
        }))
    }
}

struct InMemoryPartition {
    state: Arc<LedgerState>,
    released: AtomicBool,
}

impl InMemoryPartition {
    fn ensure_open(&self) -> Result<(), LedgerError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(LedgerError::PartitionClosed);
        }
        Ok(())
    }

    fn writable_key(&self, record: &TaskRecord) -> Result<LedgerKey, LedgerError> {
        let key = record.key();
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(LedgerError::WriteFailed {
                key: key.to_string(),
                reason: "write rejected (fault injection)".to_string(),
            });
        }
        Ok(key)
    }
}

#[async_trait]
impl LedgerPartition for InMemoryPartition {
    async fn get(&self, key: &LedgerKey) -> Result<Option<TaskRecord>, LedgerError> {
        self.ensure_open()?;
        Ok(self.state.records.lock().await.get(key).cloned())
    }

    async fn set(&self, record: TaskRecord) -> Result<(), LedgerError> {
        self.ensure_open()?;
        let key = self.writable_key(&record)?;
        trace!(key = %key, status = %record.status, "ledger set");
        self.state.records.lock().await.insert(key, record);
        Ok(())
    }

    async fn replace_if(
        &self,
        expected: &TaskRecord,
        record: TaskRecord,
    ) -> Result<bool, LedgerError> {
        self.ensure_open()?;
        let key = self.writable_key(&record)?;
        let mut records = self.state.records.lock().await;
        if records.get(&key) != Some(expected) {
            trace!(key = %key, "ledger replace_if skipped");
            return Ok(false);
        }
        trace!(key = %key, status = %record.status, "ledger replace_if");
        records.insert(key, record);
        Ok(true)
    }

    async fn records(&self) -> Result<Vec<TaskRecord>, LedgerError> {
        self.ensure_open()?;
        Ok(self.state.records.lock().await.values().cloned().collect())
    }

    async fn close(&self) -> Result<(), LedgerError> {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.state.open.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for InMemoryPartition {
    fn drop(&mut self) {
        // close() されずに捨てられた handle も open 数から外す
        if !self.released.swap(true, Ordering::SeqCst) {
            self.state.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OwnerId, Status, TaskId, WorkerId};
    use chrono::Utc;

    fn key(owner: &str) -> LedgerKey {
        LedgerKey::new(OwnerId::from(owner), TaskId::generate())
    }

    #[tokio::test]
    async fn set_overwrites_same_key() {
        let ledger = InMemoryLedger::new();
        let key = key("owner-a");
        let worker = WorkerId::generate();

        let partition = ledger.partition().await.unwrap();
        partition
            .set(TaskRecord::processing(&key, worker, Utc::now(), None))
            .await
            .unwrap();
        partition
            .set(TaskRecord::completed(&key, worker, serde_json::json!(42), Utc::now()))
            .await
            .unwrap();
        partition.close().await.unwrap();

        assert_eq!(ledger.len().await, 1);
        let record = ledger.get(&key).await.unwrap();
        assert_eq!(record.status, Status::Completed);
        assert_eq!(record.result, Some(serde_json::json!(42)));
    }

    #[tokio::test]
    async fn same_task_id_under_different_owners_are_distinct() {
        let ledger = InMemoryLedger::new();
        let task_id = TaskId::generate();
        let a = LedgerKey::new(OwnerId::from("owner-a"), task_id);
        let b = LedgerKey::new(OwnerId::from("owner-b"), task_id);

        let partition = ledger.partition().await.unwrap();
        let worker = WorkerId::generate();
        partition
            .set(TaskRecord::processing(&a, worker, Utc::now(), None))
            .await
            .unwrap();
        partition
            .set(TaskRecord::processing(&b, worker, Utc::now(), None))
            .await
            .unwrap();

        assert_eq!(partition.records().await.unwrap().len(), 2);
        assert!(partition.get(&a).await.unwrap().is_some());
        partition.close().await.unwrap();
    }

    #[tokio::test]
    async fn replace_if_only_writes_over_the_expected_entry() {
        let ledger = InMemoryLedger::new();
        let task = key("owner-a");
        let worker = WorkerId::generate();
        let processing = TaskRecord::processing(&task, worker, Utc::now(), None);
        let completed = TaskRecord::completed(&task, worker, serde_json::json!(1), Utc::now());

        let partition = ledger.partition().await.unwrap();
        partition.set(processing.clone()).await.unwrap();
        assert!(partition.replace_if(&processing, completed.clone()).await.unwrap());
        assert_eq!(ledger.get(&task).await.unwrap(), completed);

        // 既に書き換わっているので何もしない
        let expired = processing.expire(Utc::now());
        assert!(!partition.replace_if(&processing, expired).await.unwrap());
        assert_eq!(ledger.get(&task).await.unwrap(), completed);

        // 存在しないキーにも書かない
        let other = TaskRecord::processing(&key("owner-b"), worker, Utc::now(), None);
        assert!(!partition.replace_if(&other, other.clone()).await.unwrap());
        assert_eq!(ledger.len().await, 1);
        partition.close().await.unwrap();
    }

    #[tokio::test]
    async fn partition_accounting() {
        let ledger = InMemoryLedger::new();
        let p1 = ledger.partition().await.unwrap();
        let p2 = ledger.partition().await.unwrap();
        assert_eq!(ledger.open_partitions(), 2);

        p1.close().await.unwrap();
        p1.close().await.unwrap();
        assert_eq!(ledger.open_partitions(), 1);
        assert!(matches!(
            p1.get(&key("owner-a")).await,
            Err(LedgerError::PartitionClosed)
        ));

        drop(p2);
        assert_eq!(ledger.open_partitions(), 0);
        assert_eq!(ledger.opened_partitions(), 2);
    }

    #[tokio::test]
    async fn fault_injection_and_closed_ledger() {
        let ledger = InMemoryLedger::new();
        ledger.set_fail_writes(true);

        let partition = ledger.partition().await.unwrap();
        let err = partition
            .set(TaskRecord::processing(&key("owner-a"), WorkerId::generate(), Utc::now(), None))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::WriteFailed { .. }));
        partition.close().await.unwrap();
        assert!(ledger.is_empty().await);

        ledger.close();
        assert!(matches!(
            ledger.partition().await,
            Err(LedgerError::Unavailable(_))
        ));
    }
}
