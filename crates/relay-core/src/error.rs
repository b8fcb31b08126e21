use thiserror::Error;

use crate::app::builder::BuildError;
use crate::app::producer::ProducerError;
use crate::config::ConfigError;
use crate::ports::{CodecError, LedgerError, TransportError};
use crate::router::registry::RegistryError;
use crate::typed::registry::TypedRegistryError;

/// Crate-level error for callers that want a single type.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    TypedRegistry(#[from] TypedRegistryError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Producer(#[from] ProducerError),
}
