//! Domain model (IDs, identity, descriptors, status, ledger records).

pub mod descriptor;
pub mod identity;
pub mod ids;
pub mod operation;
pub mod record;
pub mod status;

pub use descriptor::TaskDescriptor;
pub use identity::{OwnerId, WorkerIdentity};
pub use ids::{Id, IdMarker, ParseIdError, TaskId, WorkerId};
pub use operation::Operation;
pub use record::{FailureKind, LedgerKey, TaskFailure, TaskRecord};
pub use status::Status;
