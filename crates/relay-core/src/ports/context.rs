//! WorkerContext port - タスクを実行するワーカー側のコンテキスト
//!
//! handler は descriptor の `WorkerIdentity` から毎回コンテキストを組み立て、
//! operation をそのコンテキストで実行します。
//!
//! # 実装
//! - **RegistryContextFactory**（`typed::context`）: `TypedRegistry` で operation を振り分ける

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Operation, WorkerIdentity};

/// Context construction failure (message-fatal: the task is dropped without a record).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContextError {
    #[error("invalid worker identity: {0}")]
    InvalidIdentity(String),

    #[error("unknown worker: {0}")]
    UnknownWorker(String),
}

/// Operation failure (task-level: recorded as `ERRORED`).
#[derive(Debug, Clone, thiserror::Error)]
pub enum OperationError {
    #[error("no handler for operation kind '{0}'")]
    UnknownOperation(String),

    #[error("invalid arguments for '{kind}': {reason}")]
    InvalidArgs { kind: String, reason: String },

    #[error("{0}")]
    Failed(String),
}

impl OperationError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[async_trait]
pub trait WorkerContext: Send + Sync {
    fn identity(&self) -> &WorkerIdentity;

    async fn execute(&self, operation: Operation) -> Result<serde_json::Value, OperationError>;
}

pub trait WorkerContextFactory: Send + Sync {
    fn build(&self, identity: &WorkerIdentity) -> Result<Arc<dyn WorkerContext>, ContextError>;
}
