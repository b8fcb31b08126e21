//! Task status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a task as seen through the ledger.
///
/// State transitions:
/// - Submitted -> Processing -> Completed
/// - Submitted -> Processing -> Errored
/// - Completed / Errored -> Processing (transport-level redelivery re-runs the task)
/// - Processing -> Errored (lease expired, written by the reaper)
///
/// `Submitted` is never stored: it is what a poller sees before the handler
/// has written the first `Processing` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Submitted,
    Processing,
    Completed,
    Errored,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Submitted => "SUBMITTED",
            Status::Processing => "PROCESSING",
            Status::Completed => "COMPLETED",
            Status::Errored => "ERRORED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
