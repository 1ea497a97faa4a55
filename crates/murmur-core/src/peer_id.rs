//! Peer identifiers.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::crypto::Pubkey;
use crate::error::{CoreError, Result};

/// Size of a peer id in bytes.
pub const PEER_ID_SIZE: usize = 32;

/// A 32-byte peer identifier, computed as SHA-256(pubkey).
///
/// Stable key for per-peer state. Once a contact is known its id is stored
/// alongside it rather than recomputed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub [u8; PEER_ID_SIZE]);

impl PeerId {
    /// Derive the id of a public key.
    pub fn from_pubkey(pubkey: &Pubkey) -> Self {
        Self(Sha256::digest(pubkey.as_bytes()).into())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; PEER_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; PEER_ID_SIZE] = bytes.try_into().map_err(|_| CoreError::InvalidLength {
            expected: PEER_ID_SIZE,
            got: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; PEER_ID_SIZE] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self> {
        Self::from_slice(&BASE64.decode(s)?)
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        Self::from_slice(&hex::decode(s)?)
    }

    /// Whether this id was derived from `pubkey`.
    pub fn matches(&self, pubkey: &Pubkey) -> bool {
        *self == Self::from_pubkey(pubkey)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PeerId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<&Pubkey> for PeerId {
    fn from(pubkey: &Pubkey) -> Self {
        Self::from_pubkey(pubkey)
    }
}

impl AsRef<[u8]> for PeerId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
