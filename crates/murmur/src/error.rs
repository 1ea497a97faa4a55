//! Error types for the node.

use murmur_core::CoreError;
use murmur_store::StoreError;
use murmur_sync::{SyncError, TransportError};
use thiserror::Error;

/// Errors that can occur during node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Crypto failure, e.g. sealing to an invalid key.
    #[error("crypto error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The node was shut down.
    #[error("node stopped")]
    Stopped,
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
