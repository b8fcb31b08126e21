//! Task record: the ledger entry for one `(owner, task_id)` key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::identity::OwnerId;
use super::ids::{TaskId, WorkerId};
use super::status::Status;

/// Ledger key. The ledger is a map over this key, not a log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerKey {
    pub owner: OwnerId,
    pub task_id: TaskId,
}

impl LedgerKey {
    pub fn new(owner: OwnerId, task_id: TaskId) -> Self {
        Self { owner, task_id }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.task_id)
    }
}

/// Why an `ERRORED` record failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The operation returned an error.
    Operation,
    /// The operation panicked while executing.
    Panicked,
    /// The `PROCESSING` lease ran out before the handler resolved the task.
    LeaseExpired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Ledger entry for one task.
///
/// Design:
/// - Written only by the handler bound to the task's queue (and by the reaper
///   for expired leases).
/// - Every write replaces the whole entry; nothing is merged from a previous
///   delivery of the same task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub owner_id: OwnerId,
    pub task_id: TaskId,
    pub status: Status,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    pub resolved: bool,

    /// Set only on `ERRORED` records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<TaskFailure>,

    /// Worker that wrote this record (None for reaper writes on records that had none).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,

    pub updated_at: DateTime<Utc>,

    /// Only present on `PROCESSING` records when a lease TTL is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_expires_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// In-flight record, written before the operation runs.
    pub fn processing(
        key: &LedgerKey,
        worker_id: WorkerId,
        now: DateTime<Utc>,
        lease_expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            owner_id: key.owner.clone(),
            task_id: key.task_id,
            status: Status::Processing,
            result: None,
            resolved: false,
            failure: None,
            worker_id: Some(worker_id),
            updated_at: now,
            lease_expires_at,
        }
    }

    pub fn completed(
        key: &LedgerKey,
        worker_id: WorkerId,
        result: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_id: key.owner.clone(),
            task_id: key.task_id,
            status: Status::Completed,
            result: Some(result),
            resolved: true,
            failure: None,
            worker_id: Some(worker_id),
            updated_at: now,
            lease_expires_at: None,
        }
    }

    pub fn errored(
        key: &LedgerKey,
        worker_id: Option<WorkerId>,
        failure: TaskFailure,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_id: key.owner.clone(),
            task_id: key.task_id,
            status: Status::Errored,
            result: None,
            resolved: true,
            failure: Some(failure),
            worker_id,
            updated_at: now,
            lease_expires_at: None,
        }
    }

    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(self.owner_id.clone(), self.task_id)
    }

    /// A `PROCESSING` record whose lease has run out. Records without a lease never expire.
    pub fn is_lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == Status::Processing
            && self.lease_expires_at.is_some_and(|deadline| deadline <= now)
    }

    /// Turn an expired in-flight record into its terminal `ERRORED` form.
    pub fn expire(&self, now: DateTime<Utc>) -> Self {
        let deadline = self
            .lease_expires_at
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        Self::errored(
            &self.key(),
            self.worker_id,
            TaskFailure::new(
                FailureKind::LeaseExpired,
                format!("no update before lease deadline {deadline}"),
            ),
            now,
        )
    }
}
