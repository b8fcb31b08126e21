//! InMemoryTransport - 開発・テスト用の in-process broker
//!
//! # 振る舞い
//! - `inproc://` のアドレスだけが到達可能（`tcp://` はパースできるが start で Unreachable）
//! - client の `start()` で publish/subscribe アドレスを bind して配送開始
//! - start 前の publish は `NotStarted`、close 後は `Closed`
//! - 同じ queue 名の subscriber は competing consumer
//! - subscriber の配送ループは `HandlerError` で停止し、そのエラーは `close()` で返る
//!
//! clone した transport は同じ broker を共有します（producer と worker を同一プロセスで動かす場合など）。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::inmem_delivery::InMemoryDeliveryQueue;
use crate::config::ClientConfig;
use crate::ports::{
    Endpoint, MessageHandler, Publisher, Subscriber, TransportClient, TransportError,
    TransportFactory,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum HubState {
    Idle,
    Running { pub_addr: Endpoint, sub_addr: Endpoint },
    Closed,
}

struct Hub {
    queue: InMemoryDeliveryQueue,
    state: watch::Sender<HubState>,
}

#[derive(Clone)]
pub struct InMemoryTransport {
    hub: Arc<Hub>,
    poll_interval: Duration,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        let (state, _) = watch::channel(HubState::Idle);
        Self {
            hub: Arc::new(Hub {
                queue: InMemoryDeliveryQueue::new(),
                state,
            }),
            poll_interval: ClientConfig::default().poll_interval,
        }
    }

    /// How long subscriber loops block on an empty queue before re-checking shutdown.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Messages published to `queue` that no subscriber has taken yet.
    pub async fn pending(&self, queue: &str) -> usize {
        self.hub.queue.len(queue).await
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn reachable(address: &str) -> Result<Endpoint, TransportError> {
    let endpoint: Endpoint = address.parse()?;
    match endpoint {
        Endpoint::Inproc(_) => Ok(endpoint),
        Endpoint::Tcp { .. } => Err(TransportError::Unreachable(format!(
            "{endpoint} (in-memory transport only serves inproc:// endpoints)"
        ))),
    }
}

impl TransportFactory for InMemoryTransport {
    fn new_client(&self, config: &ClientConfig) -> Result<Arc<dyn TransportClient>, TransportError> {
        Ok(Arc::new(InMemoryClient {
            hub: Arc::clone(&self.hub),
            pub_addr: config.pub_addr.clone(),
            sub_addr: config.sub_addr.clone(),
        }))
    }

    fn new_publisher(&self, address: &str) -> Result<Arc<dyn Publisher>, TransportError> {
        let address = reachable(address)?;
        Ok(Arc::new(InMemoryPublisher {
            hub: Arc::clone(&self.hub),
            address,
            closed: std::sync::atomic::AtomicBool::new(false),
        }))
    }

    fn new_subscriber(
        &self,
        queue: &str,
        handler: Arc<dyn MessageHandler>,
        address: &str,
    ) -> Result<Arc<dyn Subscriber>, TransportError> {
        let address = reachable(address)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Other(format!("subscriber needs a tokio runtime: {e}")))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = runtime.spawn(subscriber_loop(
            queue.to_string(),
            address,
            handler,
            Arc::clone(&self.hub),
            self.poll_interval,
            shutdown_rx,
        ));

        debug!(queue, "in-memory subscriber spawned");
        Ok(Arc::new(InMemorySubscriber {
            queue: queue.to_string(),
            shutdown_tx,
            join: Mutex::new(Some(join)),
        }))
    }
}

struct InMemoryClient {
    hub: Arc<Hub>,
    pub_addr: String,
    sub_addr: String,
}

#[async_trait]
impl TransportClient for InMemoryClient {
    async fn start(&self) -> Result<(), TransportError> {
        let pub_addr = reachable(&self.pub_addr)?;
        let sub_addr = reachable(&self.sub_addr)?;
        if pub_addr == sub_addr {
            return Err(TransportError::InvalidAddress {
                address: self.sub_addr.clone(),
                reason: "publish and subscribe addresses must differ".to_string(),
            });
        }

        let wanted = HubState::Running { pub_addr, sub_addr };
        let current = self.hub.state.borrow().clone();
        if current == wanted {
            return Ok(());
        }
        match current {
            HubState::Closed => Err(TransportError::Closed),
            HubState::Running { pub_addr, .. } => Err(TransportError::Unreachable(format!(
                "broker already bound to {pub_addr}"
            ))),
            HubState::Idle => {
                info!(pub_addr = %self.pub_addr, sub_addr = %self.sub_addr, "in-memory broker started");
                self.hub.state.send_replace(wanted);
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        let previous = self.hub.state.send_replace(HubState::Closed);
        if previous != HubState::Closed {
            info!("in-memory broker closed");
        }
        Ok(())
    }
}

struct InMemoryPublisher {
    hub: Arc<Hub>,
    address: Endpoint,
    closed: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn publish(&self, queue: &str, message: Vec<u8>) -> Result<(), TransportError> {
        use std::sync::atomic::Ordering;

        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let state = self.hub.state.borrow().clone();
        match state {
            HubState::Idle => Err(TransportError::NotStarted),
            HubState::Closed => Err(TransportError::Closed),
            HubState::Running { pub_addr, .. } if pub_addr != self.address => Err(
                TransportError::Unreachable(format!("no broker listening on {}", self.address)),
            ),
            HubState::Running { .. } => {
                debug!(queue, bytes = message.len(), "publish");
                self.hub.queue.push(queue, message).await;
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

struct InMemorySubscriber {
    queue: String,
    shutdown_tx: watch::Sender<bool>,
    join: Mutex<Option<JoinHandle<Result<(), TransportError>>>>,
}

#[async_trait]
impl Subscriber for InMemorySubscriber {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.shutdown_tx.send_replace(true);

        let Some(join) = self.join.lock().await.take() else {
            return Ok(());
        };
        // 実行中の handler は待たずに打ち切る
        if !join.is_finished() {
            join.abort();
        }
        match join.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(TransportError::SubscriberFailed {
                queue: self.queue.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

async fn subscriber_loop(
    queue: String,
    address: Endpoint,
    handler: Arc<dyn MessageHandler>,
    hub: Arc<Hub>,
    poll_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), TransportError> {
    let mut state_rx = hub.state.subscribe();

    loop {
        if *shutdown_rx.borrow() {
            return Ok(());
        }

        let state = state_rx.borrow_and_update().clone();
        match state {
            HubState::Closed => return Ok(()),
            HubState::Idle => {
                // broker の start を待つ
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() {
                            return Ok(());
                        }
                    }
                    _ = state_rx.changed() => {}
                }
                continue;
            }
            HubState::Running { sub_addr, .. } if sub_addr != address => {
                return Err(TransportError::Unreachable(format!(
                    "no broker listening on {address}"
                )));
            }
            HubState::Running { .. } => {}
        }

        let message = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                continue;
            }
            _ = state_rx.changed() => continue,
            message = hub.queue.pop(&queue, poll_interval) => message,
        };

        let Some(message) = message else {
            continue;
        };

        // handler の実行中はこのループが止まる（1 subscriber = 1 in-flight）
        if let Err(e) = handler.handle(&message).await {
            error!(queue = %queue, error = %e, "handler failed fatally; subscriber stopping");
            return Err(TransportError::SubscriberFailed {
                queue,
                reason: e.to_string(),
            });
        }
    }
}
