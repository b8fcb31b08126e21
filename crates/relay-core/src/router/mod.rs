//! Router - queue 名と transport の publisher / subscriber を結び付ける
//!
//! # 設計原則
//! - client は `new()` で 1 回だけ作る（eager）
//! - publisher は最初のアクセスで 1 回だけ作る（lazy, `OnceCell` で単一初期化）
//! - subscriber は queue 名ごとに作成順で保持し、同じ queue に複数作れる（worker pool）
//! - router はメッセージの中身を解釈しない
//! - リトライはしない（構築・起動の失敗はそのまま呼び出し元へ）
//!
//! # 使用例
//! ```ignore
//! let router = QueueRouter::new(QueueConfig::new(ClientConfig::default(), Arc::new(transport)))?;
//! router.start().await?;
//! router.create_subscriber(handler.clone()).await?;
//! router.create_subscriber(handler).await?; // 2 つ目の competing consumer
//!
//! router.publisher().await?.publish("task_call", bytes).await?;
//! router.close().await?;
//! ```

pub mod registry;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::ports::{
    MessageHandler, Publisher, Subscriber, TransportClient, TransportError, TransportFactory,
};

pub use self::registry::{HandlerRegistry, RegistryError};

/// Everything a router needs from its deployment: addresses and the transport factory.
#[derive(Clone)]
pub struct QueueConfig {
    pub client: ClientConfig,
    pub transport: Arc<dyn TransportFactory>,
}

impl QueueConfig {
    pub fn new(client: ClientConfig, transport: Arc<dyn TransportFactory>) -> Self {
        Self { client, transport }
    }
}

pub struct QueueRouter {
    config: QueueConfig,
    client: Arc<dyn TransportClient>,
    publisher: OnceCell<Arc<dyn Publisher>>,
    subscribers: Mutex<HashMap<String, Vec<Arc<dyn Subscriber>>>>,
}

impl QueueRouter {
    /// Build the router and its transport client. Nothing is started yet.
    pub fn new(config: QueueConfig) -> Result<Self, TransportError> {
        let client = config.transport.new_client(&config.client)?;
        Ok(Self {
            config,
            client,
            publisher: OnceCell::new(),
            subscribers: Mutex::new(HashMap::new()),
        })
    }

    pub async fn start(&self) -> Result<(), TransportError> {
        self.client.start().await?;
        info!(pub_addr = %self.pub_addr(), sub_addr = %self.sub_addr(), "router started");
        Ok(())
    }

    /// Bind one more subscriber to the handler's queue.
    ///
    /// Calling this again for the same queue adds a competing consumer.
    pub async fn create_subscriber(
        &self,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Arc<dyn Subscriber>, TransportError> {
        let queue = handler.queue().to_string();
        let subscriber =
            self.config
                .transport
                .new_subscriber(&queue, handler, self.sub_addr())?;

        let mut subscribers = self.subscribers.lock().await;
        let bound = subscribers.entry(queue.clone()).or_default();
        bound.push(Arc::clone(&subscriber));
        debug!(queue = %queue, slot = bound.len(), "subscriber created");
        Ok(subscriber)
    }

    /// The router's publisher, constructed on first access.
    pub async fn publisher(&self) -> Result<Arc<dyn Publisher>, TransportError> {
        let publisher = self
            .publisher
            .get_or_try_init(|| async {
                debug!(pub_addr = %self.pub_addr(), "publisher created");
                self.config.transport.new_publisher(self.pub_addr())
            })
            .await?;
        Ok(Arc::clone(publisher))
    }

    pub fn pub_addr(&self) -> &str {
        &self.config.client.pub_addr
    }

    pub fn sub_addr(&self) -> &str {
        &self.config.client.sub_addr
    }

    pub async fn subscriber_count(&self, queue: &str) -> usize {
        self.subscribers.lock().await.get(queue).map_or(0, Vec::len)
    }

    /// Close every subscriber, then the publisher (if it was ever built), then the client.
    ///
    /// In-flight handler invocations are abandoned. Every resource gets its
    /// close call even when an earlier one fails; the first failure is returned.
    pub async fn close(&self) -> Result<(), TransportError> {
        let subscribers: Vec<(String, Vec<Arc<dyn Subscriber>>)> =
            self.subscribers.lock().await.drain().collect();

        let mut first_error: Option<TransportError> = None;
        let mut record = |result: Result<(), TransportError>, what: &str| {
            if let Err(e) = result {
                warn!(resource = what, error = %e, "close failed");
                first_error.get_or_insert(e);
            }
        };

        for (queue, bound) in subscribers {
            for subscriber in bound {
                record(subscriber.close().await, &queue);
            }
        }
        if let Some(publisher) = self.publisher.get() {
            record(publisher.close().await, "publisher");
        }
        record(self.client.close().await, "client");

        info!("router closed");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
