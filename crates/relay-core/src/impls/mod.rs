//! Impls - ports の具体実装
//!
//! どれもプロセス内で完結する実装で、開発・テスト・デモ用です。

pub mod inmem_delivery;
pub mod inmem_ledger;
pub mod inmem_transport;
pub mod json_codec;

pub use self::inmem_delivery::InMemoryDeliveryQueue;
pub use self::inmem_ledger::InMemoryLedger;
pub use self::inmem_transport::InMemoryTransport;
pub use self::json_codec::JsonCodec;
