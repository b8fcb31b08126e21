//! Ports - 抽象化レイヤー
//!
//! Router と handler が依存する外部コラボレーターの契約です。
//! 実装（broker, stash, codec, ワーカーのビジネスロジック）は差し替え可能です。
//!
//! # 構成
//! - transport: publish/subscribe の factory 契約
//! - ledger: `(owner, task_id)` キーの結果ストア
//! - codec: TaskDescriptor <-> bytes
//! - context: WorkerIdentity からの実行コンテキスト構築
//! - clock / id_generator: 時刻と ID 採番

pub mod clock;
pub mod codec;
pub mod context;
pub mod id_generator;
pub mod ledger;
pub mod transport;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::codec::{CodecError, TaskCodec};
pub use self::context::{ContextError, OperationError, WorkerContext, WorkerContextFactory};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::ledger::{LedgerError, LedgerPartition, TaskLedger};
pub use self::transport::{
    Endpoint, HandlerError, MessageHandler, Publisher, Subscriber, TransportClient,
    TransportError, TransportFactory,
};
