//! Error types for murmur core.

use thiserror::Error;

/// Errors from key handling and identity encodings.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("encryption failed")]
    Encryption,

    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("hex decoding error: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Errors from the wire codecs: varuint, multiaddr, versions and the
/// canonical encoding of headers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("varuint is truncated")]
    VarintTruncated,

    #[error("varuint overflows 64 bits")]
    VarintOverflow,

    #[error("invalid multiaddr: {0}")]
    InvalidMultiaddr(String),

    #[error("unknown protocol code: {0}")]
    UnknownProtocol(u64),

    #[error("invalid uuid: {0}")]
    InvalidUuid(String),

    #[error("invalid semantic version: {0:?}")]
    InvalidVersion(String),

    #[error("malformed encoding: {0}")]
    Malformed(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
