//! TypedRegistry - operation handler の登録と管理
//!
//! - `register::<T: TypedOperation>(handler: impl Handler<T>)` で登録
//! - 内部的に TypedHandler でラップして DynHandler に変換
//! - `HashMap<String, Arc<dyn DynHandler>>` で管理

use crate::typed::handler::TypedHandler;

use super::handler::{DynHandler, Handler};
use super::operation::TypedOperation;
use std::collections::HashMap;
use std::sync::Arc;

/// TypedRegistry は型付き Handler を operation kind ごとに保持
///
/// # 使用例
/// ```ignore
/// let mut registry = TypedRegistry::new();
/// registry.register::<Add, _>(AddHandler)?;
///
/// let handler = registry.get("math.add.v1");
/// ```
///
/// 初期化時に組み立てて、実行時は `Arc<TypedRegistry>` として読み取り専用で共有します。
#[derive(Default)]
pub struct TypedRegistry {
    handlers: HashMap<String, Arc<dyn DynHandler>>,
}

#[derive(Debug, thiserror::Error)]
pub enum TypedRegistryError {
    #[error("Handler for operation kind '{0}' is already registered")]
    AlreadyRegistered(String),
}

impl TypedRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register<T: TypedOperation, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), TypedRegistryError> {
        let kind = T::KIND.to_string();
        if self.handlers.contains_key(&kind) {
            return Err(TypedRegistryError::AlreadyRegistered(kind));
        }
        self.handlers
            .insert(kind, Arc::new(TypedHandler::<T, H>::new(handler)));
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(kind).cloned()
    }

    /// Registered kinds, sorted.
    pub fn registered_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.handlers.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
