//! relay-core
//!
//! Queue router and task dispatch for Relay workers.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, identity, operation, descriptor, status, record）
//! - **ports**: 抽象化レイヤー（transport, ledger, codec, worker context, clock, id_generator）
//! - **router**: QueueRouter と queue 名 -> handler の登録表
//! - **app**: アプリケーションロジック（task_handler, producer, status, reaper_loop, builder）
//! - **typed**: 型付き Operation API（TypedOperation, Handler, TypedRegistry, RegistryContextFactory）
//! - **impls**: 実装（InMemoryTransport, InMemoryLedger, JsonCodec など開発用）
//! - **config**: 環境変数からの設定読み込み
//! - **error**: crate 全体のエラー型

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod router;
pub mod typed;

pub use self::error::RelayError;
