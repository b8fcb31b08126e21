//! RegistryContextFactory - WorkerIdentity から WorkerContext を組み立てる
//!
//! 組み立てたコンテキストは `Operation.kind` で TypedRegistry を引いて実行します。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::registry::TypedRegistry;
use crate::domain::{Operation, WorkerId, WorkerIdentity};
use crate::ports::{ContextError, OperationError, WorkerContext, WorkerContextFactory};

pub struct RegistryContextFactory {
    registry: Arc<TypedRegistry>,
    allowed_workers: Option<HashSet<WorkerId>>,
}

impl RegistryContextFactory {
    pub fn new(registry: Arc<TypedRegistry>) -> Self {
        Self {
            registry,
            allowed_workers: None,
        }
    }

    /// Only identities whose worker id is listed here can build a context.
    pub fn with_allowed_workers(mut self, workers: impl IntoIterator<Item = WorkerId>) -> Self {
        self.allowed_workers = Some(workers.into_iter().collect());
        self
    }
}

impl WorkerContextFactory for RegistryContextFactory {
    fn build(&self, identity: &WorkerIdentity) -> Result<Arc<dyn WorkerContext>, ContextError> {
        if identity.owner.is_empty() {
            return Err(ContextError::InvalidIdentity(
                "owner credentials are empty".to_string(),
            ));
        }
        if identity.name.trim().is_empty() {
            return Err(ContextError::InvalidIdentity("worker name is empty".to_string()));
        }
        if let Some(allowed) = &self.allowed_workers {
            if !allowed.contains(&identity.worker_id) {
                return Err(ContextError::UnknownWorker(identity.worker_id.to_string()));
            }
        }

        Ok(Arc::new(RegistryContext {
            identity: identity.clone(),
            registry: Arc::clone(&self.registry),
        }))
    }
}

struct RegistryContext {
    identity: WorkerIdentity,
    registry: Arc<TypedRegistry>,
}

#[async_trait]
impl WorkerContext for RegistryContext {
    fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    async fn execute(&self, operation: Operation) -> Result<serde_json::Value, OperationError> {
        let handler = self
            .registry
            .get(&operation.kind)
            .ok_or_else(|| OperationError::UnknownOperation(operation.kind.clone()))?;
        handler.handle_dyn(&self.identity, operation.args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OwnerId;
    use crate::typed::handler::fixtures::AddHandler;
    use crate::typed::operation::fixtures::Add;
    use crate::typed::TypedOperation;
    use serde_json::json;

    fn factory() -> RegistryContextFactory {
        let mut registry = TypedRegistry::new();
        registry.register::<Add, _>(AddHandler).unwrap();
        RegistryContextFactory::new(Arc::new(registry))
    }

    fn identity(owner: &str, name: &str) -> WorkerIdentity {
        WorkerIdentity::new(WorkerId::generate(), name, OwnerId::from(owner))
    }

    #[tokio::test]
    async fn dispatches_by_kind() {
        let ctx = factory().build(&identity("owner-a", "w1")).unwrap();
        assert_eq!(ctx.identity().name, "w1");

        let out = ctx
            .execute(Operation::new(Add::KIND, json!({ "a": 1, "b": 2 })))
            .await
            .unwrap();
        assert_eq!(out, json!(3));
    }

    #[tokio::test]
    async fn unknown_kind_is_operation_error() {
        let ctx = factory().build(&identity("owner-a", "w1")).unwrap();
        let err = ctx
            .execute(Operation::new("nope.v1", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::UnknownOperation(k) if k == "nope.v1"));
    }

    #[test]
    fn blank_identity_is_rejected() {
        assert!(matches!(
            factory().build(&identity("", "w1")),
            Err(ContextError::InvalidIdentity(_))
        ));
        assert!(matches!(
            factory().build(&identity("owner-a", " ")),
            Err(ContextError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn allow_list_rejects_unknown_workers() {
        let known = identity("owner-a", "w1");
        let factory = factory().with_allowed_workers([known.worker_id]);

        assert!(factory.build(&known).is_ok());
        assert!(matches!(
            factory.build(&identity("owner-a", "w2")),
            Err(ContextError::UnknownWorker(_))
        ));
    }
}
