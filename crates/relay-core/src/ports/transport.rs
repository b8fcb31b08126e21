//! Transport port - publish/subscribe の抽象化
//!
//! Router はこの trait だけに依存します。ワイヤプロトコルやソケットの扱いは実装側の責務です。
//!
//! # 設計原則
//! - factory（`TransportFactory`）が client / publisher / subscriber を生成する
//! - publish は fire-and-forget（同期的な ack は返らない）
//! - 同じ queue に bind された subscriber 同士は competing consumer（1 メッセージは 1 subscriber へ）
//! - subscriber ごとに配送ループを持ち、handler の実行中はそのループが止まる
//!
//! # 実装
//! - **InMemoryTransport**（`impls::inmem_transport`）: 開発・テスト用

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ClientConfig;
use crate::ports::ledger::LedgerError;

/// Transport-fatal errors. The router never retries these.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("transport not started")]
    NotStarted,

    #[error("transport closed")]
    Closed,

    #[error("subscriber for queue '{queue}' stopped: {reason}")]
    SubscriberFailed { queue: String, reason: String },

    #[error("{0}")]
    Other(String),
}

/// Errors a message handler lets escape to its subscriber loop.
///
/// Anything scoped to a single message is handled inside the handler; what
/// reaches the transport is serious enough to stop the subscriber.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    #[error("ledger write failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("{0}")]
    Other(String),
}

/// A transport endpoint address.
///
/// - `inproc://<name>`: in-process broker
/// - `tcp://<host>:<port>`: network broker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Inproc(String),
    Tcp { host: String, port: u16 },
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TransportError::InvalidAddress {
            address: s.to_string(),
            reason: reason.to_string(),
        };

        if let Some(name) = s.strip_prefix("inproc://") {
            if name.is_empty() {
                return Err(invalid("empty inproc name"));
            }
            return Ok(Endpoint::Inproc(name.to_string()));
        }

        if let Some(rest) = s.strip_prefix("tcp://") {
            let (host, port) = rest.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
            if host.is_empty() {
                return Err(invalid("empty host"));
            }
            let port = port.parse::<u16>().map_err(|e| invalid(&e.to_string()))?;
            return Ok(Endpoint::Tcp {
                host: host.to_string(),
                port,
            });
        }

        Err(invalid("unsupported scheme (expected inproc:// or tcp://)"))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Inproc(name) => write!(f, "inproc://{name}"),
            Endpoint::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
        }
    }
}

/// The capability a subscriber delivers raw message bytes to.
///
/// Implementations are bound to exactly one queue name. The transport does
/// not interpret the bytes and nothing is sent back to the publisher.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn queue(&self) -> &str;

    async fn handle(&self, message: &[u8]) -> Result<(), HandlerError>;
}

/// Connection handle owned by a router.
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Activate delivery. Fails if the broker endpoint is unreachable.
    async fn start(&self) -> Result<(), TransportError>;

    /// Release all resources. Safe to call more than once.
    async fn close(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Fire-and-forget publish onto `queue`.
    async fn publish(&self, queue: &str, message: Vec<u8>) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait Subscriber: Send + Sync {
    fn queue(&self) -> &str;

    /// Stop the delivery loop. In-flight handler work is abandoned, not drained.
    ///
    /// If the loop already stopped on a `HandlerError`, that failure is returned here.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Transport factory contract (publish/subscribe addresses come from `ClientConfig`).
pub trait TransportFactory: Send + Sync {
    fn new_client(&self, config: &ClientConfig) -> Result<Arc<dyn TransportClient>, TransportError>;

    fn new_publisher(&self, address: &str) -> Result<Arc<dyn Publisher>, TransportError>;

    fn new_subscriber(
        &self,
        queue: &str,
        handler: Arc<dyn MessageHandler>,
        address: &str,
    ) -> Result<Arc<dyn Subscriber>, TransportError>;
}
