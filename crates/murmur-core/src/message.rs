//! Messages carried by the sync protocol.
//!
//! On the wire a message is its canonical header in one frame followed by
//! exactly `header.size` payload bytes. Recipients are local routing data
//! and are not transmitted.

use bytes::Bytes;
use ciborium::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canonical::{self, MapView};
use crate::crc64::crc64;
use crate::crypto::Pubkey;
use crate::error::WireError;

mod keys {
    pub const TIMESTAMP: u64 = 0;
    pub const CHECKSUM: u64 = 1;
    pub const SIZE: u64 = 2;
}

/// Message metadata sent ahead of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Unix milliseconds at creation.
    pub timestamp: u64,
    /// CRC-64 of the payload.
    pub checksum: u64,
    /// Payload length in bytes.
    pub size: u32,
}

impl MessageHeader {
    pub fn encode(&self) -> Vec<u8> {
        canonical::encode_map(vec![
            (keys::TIMESTAMP, Value::Integer(self.timestamp.into())),
            (keys::CHECKSUM, Value::Integer(self.checksum.into())),
            (keys::SIZE, Value::Integer(self.size.into())),
        ])
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let value = canonical::decode(bytes)?;
        let map = MapView::new(&value)?;
        Ok(Self {
            timestamp: map.u64(keys::TIMESTAMP, "timestamp")?,
            checksum: map.u64(keys::CHECKSUM, "checksum")?,
            size: map.u32(keys::SIZE, "size")?,
        })
    }
}

/// Content address of a message: BLAKE3(canonical header ‖ payload).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub [u8; 32]);

impl MessageId {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex()[..16])
    }
}

/// A payload with its header and intended recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub header: MessageHeader,
    pub data: Bytes,
    pub recipients: Vec<Pubkey>,
}

impl Message {
    /// Build a message, filling in checksum and size.
    ///
    /// Payloads longer than `u32::MAX` get a saturated size and are never
    /// [`intact`](Self::is_intact).
    pub fn new(data: impl Into<Bytes>, recipients: Vec<Pubkey>, timestamp: u64) -> Self {
        let data = data.into();
        Self {
            header: MessageHeader {
                timestamp,
                checksum: crc64(&data),
                size: u32::try_from(data.len()).unwrap_or(u32::MAX),
            },
            data,
            recipients,
        }
    }

    /// Reassemble a message read off the wire. Recipients are unknown.
    pub fn from_parts(header: MessageHeader, data: impl Into<Bytes>) -> Self {
        Self {
            header,
            data: data.into(),
            recipients: Vec::new(),
        }
    }

    /// Whether size and checksum match the payload.
    pub fn is_intact(&self) -> bool {
        self.header.size as usize == self.data.len() && self.header.checksum == crc64(&self.data)
    }

    pub fn id(&self) -> MessageId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.header.encode());
        hasher.update(&self.data);
        MessageId(*hasher.finalize().as_bytes())
    }

    pub fn is_addressed_to(&self, pubkey: &Pubkey) -> bool {
        self.recipients.contains(pubkey)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
