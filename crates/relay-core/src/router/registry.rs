use std::collections::HashMap;
use std::sync::Arc;

use crate::ports::MessageHandler;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("a handler for queue '{0}' is already registered")]
    DuplicateHandler(String),
}

/// Registry of message handlers (queue name -> handler).
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during runtime (immutable).
/// Each queue name resolves to exactly one handler; parallelism comes from
/// creating several subscribers for it, not from several handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under the queue it declares.
    pub fn register(&mut self, handler: Arc<dyn MessageHandler>) -> Result<(), RegistryError> {
        let queue = handler.queue().to_string();
        if self.handlers.contains_key(&queue) {
            return Err(RegistryError::DuplicateHandler(queue));
        }
        self.handlers.insert(queue, handler);
        Ok(())
    }

    pub fn get(&self, queue: &str) -> Option<&Arc<dyn MessageHandler>> {
        self.handlers.get(queue)
    }

    /// Registered queue names, sorted.
    pub fn queues(&self) -> Vec<String> {
        let mut queues: Vec<String> = self.handlers.keys().cloned().collect();
        queues.sort();
        queues
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
