//! AppBuilder - worker pool の構築とワイヤリング
//!
//! # 設計原則
//! - handler は queue 名で登録（同じ queue への二重登録はエラー）
//! - queue ごとに subscriber 数（slot）を指定できる
//! - 起動時検証（Fail-fast）: 期待される queue がすべて登録済みか build() でチェック

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::ports::{MessageHandler, TransportError};
use crate::router::{HandlerRegistry, QueueRouter, RegistryError};

/// AppBuilder は worker pool を構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(router)
///     .register(Arc::new(task_handler))?
///     .slots(TASK_QUEUE, 4)
///     .expect_queues(&[TASK_QUEUE])
///     .build()?;
///
/// app.start().await?;
/// // ...
/// app.shutdown().await?;
/// ```
///
/// # Fail-fast 設計
/// - expect_queues() で期待される queue 名を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - slot 数 0 の queue もエラー
pub struct AppBuilder {
    router: QueueRouter,
    registry: HandlerRegistry,
    slots: HashMap<String, usize>,
    default_slots: usize,
    expected_queues: Option<Vec<String>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing queues: {0:?}. These queues were expected but have no registered handler.")]
    MissingQueues(Vec<String>),

    #[error("Queue '{0}' is configured with zero subscriber slots")]
    ZeroSlots(String),
}

impl AppBuilder {
    pub fn new(router: QueueRouter) -> Self {
        Self {
            router,
            registry: HandlerRegistry::new(),
            slots: HashMap::new(),
            default_slots: 1,
            expected_queues: None,
        }
    }

    /// Handler を登録
    pub fn register(mut self, handler: Arc<dyn MessageHandler>) -> Result<Self, RegistryError> {
        self.registry.register(handler)?;
        Ok(self)
    }

    /// Subscribers to create for `queue` (overrides the default).
    pub fn slots(mut self, queue: &str, n: usize) -> Self {
        self.slots.insert(queue.to_string(), n);
        self
    }

    /// Subscribers per queue when no explicit count is set.
    pub fn default_slots(mut self, n: usize) -> Self {
        self.default_slots = n;
        self
    }

    pub fn expect_queues(mut self, queues: &[&str]) -> Self {
        self.expected_queues = Some(queues.iter().map(|q| q.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        let registered = self.registry.queues();

        if let Some(expected) = &self.expected_queues {
            let missing: Vec<String> = expected
                .iter()
                .filter(|q| !registered.contains(q))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingQueues(missing));
            }
        }

        let mut plan = Vec::with_capacity(registered.len());
        for queue in registered {
            let n = self.slots.get(&queue).copied().unwrap_or(self.default_slots);
            if n == 0 {
                return Err(BuildError::ZeroSlots(queue));
            }
            plan.push((queue, n));
        }

        Ok(App {
            router: Arc::new(self.router),
            registry: self.registry,
            plan,
        })
    }
}

/// App は起動済み（または起動可能な）worker pool
pub struct App {
    router: Arc<QueueRouter>,
    registry: HandlerRegistry,
    /// (queue, slots), queue 名順
    plan: Vec<(String, usize)>,
}

impl App {
    /// Start the router, then bind every handler's slots.
    pub async fn start(&self) -> Result<(), TransportError> {
        self.router.start().await?;
        for (queue, n) in &self.plan {
            let Some(handler) = self.registry.get(queue) else {
                continue;
            };
            for _ in 0..*n {
                self.router.create_subscriber(Arc::clone(handler)).await?;
            }
            info!(queue = %queue, slots = n, "worker pool bound");
        }
        Ok(())
    }

    /// The router, for publishing through it or inspecting subscribers.
    pub fn router(&self) -> &Arc<QueueRouter> {
        &self.router
    }

    pub fn queues(&self) -> Vec<String> {
        self.registry.queues()
    }

    /// Close the router. In-flight tasks are abandoned.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        self.router.close().await
    }
}
