//! Typed - 型付き Operation API
//!
//! operation kind の typo を型で排除し、Handler との対応付けを静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `TypedOperation` trait, `Handler<T>` trait - 型安全
//! - **内部（Dyn）**: `DynHandler` trait - object-safe, type erasure
//!
//! `RegistryContextFactory` がこの registry をワーカーの実行コンテキストとして公開します。

pub mod context;
pub mod handler;
pub mod operation;
pub mod registry;

pub use self::context::RegistryContextFactory;
pub use self::handler::{DynHandler, Handler};
pub use self::operation::TypedOperation;
pub use self::registry::{TypedRegistry, TypedRegistryError};
