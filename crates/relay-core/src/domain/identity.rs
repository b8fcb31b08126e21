//! Requester / worker identity carried inside every task descriptor.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::WorkerId;

/// Credentials of the requester that owns a task.
///
/// Together with the `TaskId` this is the ledger key: every status poll is
/// scoped to the owner that submitted the task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(credentials: impl Into<String>) -> Self {
        Self(credentials.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Everything a worker process needs to rebuild an execution context for one task.
///
/// `settings` is opaque to the core: it is handed to the `WorkerContextFactory`
/// untouched (store locations, signing material, and so on).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub worker_id: WorkerId,
    pub name: String,
    pub owner: OwnerId,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub settings: serde_json::Value,
}

impl WorkerIdentity {
    pub fn new(worker_id: WorkerId, name: impl Into<String>, owner: OwnerId) -> Self {
        Self {
            worker_id,
            name: name.into(),
            owner,
            settings: serde_json::Value::Null,
        }
    }

    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_owner_is_empty() {
        assert!(OwnerId::new("   ").is_empty());
        assert!(!OwnerId::new("owner-a").is_empty());
    }

    #[test]
    fn null_settings_are_omitted() {
        let identity = WorkerIdentity::new(WorkerId::generate(), "w1", OwnerId::from("owner-a"));
        let v = serde_json::to_value(&identity).unwrap();
        assert!(v.get("settings").is_none());
        assert_eq!(v["owner"], "owner-a");

        let back: WorkerIdentity = serde_json::from_value(v).unwrap();
        assert_eq!(back, identity);
    }
}
