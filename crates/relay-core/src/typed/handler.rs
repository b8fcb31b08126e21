//! Handler trait - TypedOperation を実行する Handler の定義
//!
//! - ジェネリック trait (`Handler<T>`): 表層、型安全
//! - Object-safe trait (`DynHandler`): 内部、`HashMap<String, Arc<dyn DynHandler>>` に格納
//! - `TypedHandler<T, H>` が両者をつなぐ（type erasure）

use super::operation::TypedOperation;
use crate::domain::WorkerIdentity;
use crate::ports::OperationError;
use async_trait::async_trait;
use std::marker::PhantomData;

/// Handler は operation を実行して `T::Output` を返す
///
/// # 使用例
/// ```ignore
/// struct AddHandler;
///
/// #[async_trait]
/// impl Handler<Add> for AddHandler {
///     async fn handle(&self, _worker: &WorkerIdentity, op: Add) -> Result<i64, OperationError> {
///         Ok(op.a + op.b)
///     }
/// }
/// ```
#[async_trait]
pub trait Handler<T: TypedOperation>: Send + Sync {
    async fn handle(&self, worker: &WorkerIdentity, op: T) -> Result<T::Output, OperationError>;
}

/// DynHandler は object-safe な Handler の抽象化
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(
        &self,
        worker: &WorkerIdentity,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, OperationError>;

    fn kind(&self) -> &str;
}

pub struct TypedHandler<T: TypedOperation, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: TypedOperation, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: TypedOperation, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(
        &self,
        worker: &WorkerIdentity,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, OperationError> {
        let op: T = serde_json::from_value(args).map_err(|e| OperationError::InvalidArgs {
            kind: T::KIND.to_string(),
            reason: e.to_string(),
        })?;
        let output = self.handler.handle(worker, op).await?;
        serde_json::to_value(output).map_err(|e| {
            OperationError::failed(format!("{}: output not serializable: {e}", T::KIND))
        })
    }

    fn kind(&self) -> &str {
        T::KIND
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::AddHandler;
    use super::*;
    use crate::domain::{OwnerId, WorkerId};
    use crate::typed::operation::fixtures::Add;
    use serde_json::json;

    fn worker() -> WorkerIdentity {
        WorkerIdentity::new(WorkerId::generate(), "w1", OwnerId::from("owner-a"))
    }

    #[tokio::test]
    async fn typed_handler_decodes_args_and_encodes_output() {
        let typed_handler = TypedHandler::<Add, _>::new(AddHandler);
        assert_eq!(typed_handler.kind(), "math.add.v1");

        let out = typed_handler
            .handle_dyn(&worker(), json!({ "a": 40, "b": 2 }))
            .await
            .unwrap();
        assert_eq!(out, json!(42));
    }

    #[tokio::test]
    async fn bad_args_are_invalid_args() {
        let typed_handler = TypedHandler::<Add, _>::new(AddHandler);
        let err = typed_handler
            .handle_dyn(&worker(), json!({ "a": "forty" }))
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::InvalidArgs { kind, .. } if kind == "math.add.v1"));
    }
}
