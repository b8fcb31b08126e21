//! TaskLedger port - タスク結果の正本（stash）
//!
//! `(owner, task_id)` をキーにした key-value ストアです。ログではなく map なので、
//! 同じキーへの書き込みは常に上書きになります。
//!
//! # 設計原則
//! - handler は呼び出しごとに `partition()` でハンドルを取得し、すべての終了経路で `close()` する
//! - 同じキーへの並行書き込みは想定しない（last writer wins）
//! - 書き込み失敗は握りつぶさない（呼び出し元へ伝播する）
//! - handler 以外の書き手（reaper）は `replace_if` で読んだ時点から変わっていないことを確認する

use async_trait::async_trait;

use crate::domain::{LedgerKey, TaskRecord};

#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("partition handle already closed")]
    PartitionClosed,

    #[error("ledger write failed for {key}: {reason}")]
    WriteFailed { key: String, reason: String },
}

/// Storage handle scoped to one handler invocation.
#[async_trait]
pub trait LedgerPartition: Send + Sync {
    async fn get(&self, key: &LedgerKey) -> Result<Option<TaskRecord>, LedgerError>;

    /// Overwrite the record stored under its own key.
    async fn set(&self, record: TaskRecord) -> Result<(), LedgerError>;

    /// Overwrite only if the stored entry still equals `expected`.
    /// Returns `false` (and writes nothing) when another writer got there first.
    async fn replace_if(
        &self,
        expected: &TaskRecord,
        record: TaskRecord,
    ) -> Result<bool, LedgerError>;

    /// Every record currently stored (used by the lease reaper).
    async fn records(&self) -> Result<Vec<TaskRecord>, LedgerError>;

    /// Release the handle. Calling it twice is harmless.
    async fn close(&self) -> Result<(), LedgerError>;
}

#[async_trait]
pub trait TaskLedger: Send + Sync {
    /// Open a fresh partition handle.
    async fn partition(&self) -> Result<Box<dyn LedgerPartition>, LedgerError>;
}
