//! Error types for the sync module.

use murmur_core::{PeerId, WireError};
use murmur_store::StoreError;
use thiserror::Error;

/// Failures of the underlying byte stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The stream was closed locally or by the remote.
    #[error("stream closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a handshake was rejected. Negotiation is all-or-nothing: any of
/// these means no connection was created.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeError {
    /// Oversized, undecodable or timed out frame, or a failed write.
    #[error("malformed handshake frame")]
    InvalidFormat,

    #[error("unsupported protocol version")]
    InvalidVersion,

    #[error("handshake checksum mismatch")]
    InvalidChecksum,

    /// Signature missing or not valid under the claimed key.
    #[error("invalid handshake signature")]
    InvalidSignature,

    /// The claimed identity is not a usable public key.
    #[error("invalid or missing public key")]
    InvalidPubkey,

    /// Timestamp outside the allowed clock drift.
    #[error("handshake timestamp outside drift window")]
    InvalidTimestamp,
}

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The operation cannot run against this connection.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport-level error.
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A message header could not be decoded.
    #[error("malformed message: {0}")]
    Wire(#[from] WireError),

    /// A peer announced a payload above the configured limit.
    #[error("message of {size} bytes exceeds limit of {max}")]
    MessageTooLarge { size: u32, max: u32 },

    /// No live connection to this peer.
    #[error("peer not connected: {0}")]
    NotConnected(PeerId),

    /// The multiplexer is no longer accepting work.
    #[error("multiplexer stopped")]
    Stopped,
}

/// Errors raised by transports.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no peer at {0}")]
    Unreachable(String),

    #[error("transport closed")]
    Closed,

    #[error("stream error: {0}")]
    Stream(#[from] StreamError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
