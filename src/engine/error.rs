use crate::config::ConfigError;
use crate::peer::PeerError;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors that stop the engine from starting.
///
/// Failures of a single connection never surface here; they close that
/// connection and are logged.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("peer error: {0}")]
    Peer(#[from] PeerError),

    #[error("engine already started")]
    AlreadyStarted,
}
