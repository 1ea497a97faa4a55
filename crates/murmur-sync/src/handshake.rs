//! Handshake messages and their validation.
//!
//! Each side sends one [`HandshakeMessage`] as a single frame and validates
//! the one it receives. The body (version, flags, identity, timestamp) is
//! encoded canonically; the checksum is CRC-64 of the body and the
//! signature covers `body ‖ checksum`.
//!
//! Validation short-circuits in a fixed order: version, checksum,
//! timestamp, identity.

use std::time::Duration;

use ciborium::value::Value;
use murmur_core::canonical::{self, MapView};
use murmur_core::crc64::crc64;
use murmur_core::crypto::SIGNATURE_SIZE;
use murmur_core::{Keypair, PeerId, Pubkey, Signature};

use crate::error::HandshakeError;

/// Protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: u8 = 1;

/// Largest handshake frame accepted.
pub const MAX_HANDSHAKE_SIZE: usize = 1024;

/// Default allowed clock difference between peers.
pub const MAX_CLOCK_DRIFT: Duration = Duration::from_secs(32);

/// Default bound on the whole exchange.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Flag bits.
pub mod flags {
    /// The identity claim is a public key and the message is signed.
    pub const PUBKEY: u32 = 1 << 0;
}

mod keys {
    pub const VERSION: u64 = 0;
    pub const FLAGS: u64 = 1;
    pub const PUBKEY: u64 = 2;
    pub const PEER_ID: u64 = 3;
    pub const TIMESTAMP: u64 = 4;
    pub const CHECKSUM: u64 = 5;
    pub const SIGNATURE: u64 = 6;
}

/// Who the sender says it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityClaim {
    /// Verifiable: the message is signed by this key.
    Pubkey(Pubkey),
    /// Unauthenticated: only an identifier.
    PeerId(PeerId),
}

impl IdentityClaim {
    pub fn peer_id(&self) -> PeerId {
        match self {
            IdentityClaim::Pubkey(pk) => PeerId::from_pubkey(pk),
            IdentityClaim::PeerId(id) => *id,
        }
    }

    pub fn pubkey(&self) -> Option<Pubkey> {
        match self {
            IdentityClaim::Pubkey(pk) => Some(*pk),
            IdentityClaim::PeerId(_) => None,
        }
    }
}

/// Handshake settings.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Bound on writing ours and reading theirs.
    pub timeout: Duration,
    pub max_frame_size: usize,
    pub max_clock_drift: Duration,
    /// Claim the peer id of a throwaway key instead of our public key.
    pub anonymous: bool,
    /// Reject peers that only claim a peer id.
    pub require_authenticated: bool,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: HANDSHAKE_TIMEOUT,
            max_frame_size: MAX_HANDSHAKE_SIZE,
            max_clock_drift: MAX_CLOCK_DRIFT,
            anonymous: false,
            require_authenticated: false,
        }
    }
}

impl HandshakeConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_clock_drift(mut self, drift: Duration) -> Self {
        self.max_clock_drift = drift;
        self
    }

    pub fn with_anonymous(mut self, anonymous: bool) -> Self {
        self.anonymous = anonymous;
        self
    }

    pub fn with_require_authenticated(mut self, require: bool) -> Self {
        self.require_authenticated = require;
        self
    }
}

/// One side's handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMessage {
    pub version: u8,
    pub flags: u32,
    pub identity: IdentityClaim,
    /// Unix seconds.
    pub timestamp: u64,
    pub checksum: u64,
    pub signature: Option<Signature>,
}

impl HandshakeMessage {
    /// A handshake claiming `keypair`'s public key, signed by it.
    pub fn signed(keypair: &Keypair, extra_flags: u32, timestamp: u64) -> Self {
        let mut msg = Self::unsealed(
            extra_flags | flags::PUBKEY,
            IdentityClaim::Pubkey(keypair.pubkey()),
            timestamp,
        );
        msg.signature = Some(keypair.sign(&msg.signed_bytes()));
        msg
    }

    /// An unsigned handshake claiming only `peer_id`.
    pub fn anonymous(peer_id: PeerId, extra_flags: u32, timestamp: u64) -> Self {
        Self::unsealed(extra_flags & !flags::PUBKEY, IdentityClaim::PeerId(peer_id), timestamp)
    }

    fn unsealed(flags: u32, identity: IdentityClaim, timestamp: u64) -> Self {
        let mut msg = Self {
            version: PROTOCOL_VERSION,
            flags,
            identity,
            timestamp,
            checksum: 0,
            signature: None,
        };
        msg.checksum = msg.compute_checksum();
        msg
    }

    fn body_entries(&self) -> Vec<(u64, Value)> {
        let identity = match &self.identity {
            IdentityClaim::Pubkey(pk) => (keys::PUBKEY, Value::Bytes(pk.as_bytes().to_vec())),
            IdentityClaim::PeerId(id) => (keys::PEER_ID, Value::Bytes(id.as_bytes().to_vec())),
        };
        vec![
            (keys::VERSION, Value::Integer(self.version.into())),
            (keys::FLAGS, Value::Integer(self.flags.into())),
            identity,
            (keys::TIMESTAMP, Value::Integer(self.timestamp.into())),
        ]
    }

    /// Canonical encoding of version, flags, identity and timestamp.
    pub fn body(&self) -> Vec<u8> {
        canonical::encode_map(self.body_entries())
    }

    pub fn compute_checksum(&self) -> u64 {
        crc64(&self.body())
    }

    /// The bytes the signature covers: `body ‖ checksum` (big-endian).
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut buf = self.body();
        buf.extend_from_slice(&self.checksum.to_be_bytes());
        buf
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut entries = self.body_entries();
        entries.push((keys::CHECKSUM, Value::Integer(self.checksum.into())));
        if let Some(sig) = &self.signature {
            entries.push((keys::SIGNATURE, Value::Bytes(sig.as_bytes().to_vec())));
        }
        canonical::encode_map(entries)
    }

    /// Parse a received frame. Anything structurally wrong is
    /// `InvalidFormat`; a version that cannot be ours is `InvalidVersion`.
    pub fn decode(bytes: &[u8]) -> Result<Self, HandshakeError> {
        let format = |_| HandshakeError::InvalidFormat;
        let value = canonical::decode(bytes).map_err(format)?;
        let map = MapView::new(&value).map_err(format)?;

        let version = map.u64(keys::VERSION, "version").map_err(format)?;
        let version = u8::try_from(version).map_err(|_| HandshakeError::InvalidVersion)?;

        let identity = match (map.get(keys::PUBKEY), map.get(keys::PEER_ID)) {
            (Some(_), None) => {
                IdentityClaim::Pubkey(Pubkey::from_bytes(map.fixed(keys::PUBKEY, "pubkey").map_err(format)?))
            }
            (None, Some(_)) => {
                IdentityClaim::PeerId(PeerId::from_bytes(map.fixed(keys::PEER_ID, "peer_id").map_err(format)?))
            }
            _ => return Err(HandshakeError::InvalidFormat),
        };

        let signature = match map.get(keys::SIGNATURE) {
            None => None,
            Some(_) => Some(Signature::from_bytes(
                map.fixed::<SIGNATURE_SIZE>(keys::SIGNATURE, "signature").map_err(format)?,
            )),
        };

        Ok(Self {
            version,
            flags: map.u32(keys::FLAGS, "flags").map_err(format)?,
            identity,
            timestamp: map.u64(keys::TIMESTAMP, "timestamp").map_err(format)?,
            checksum: map.u64(keys::CHECKSUM, "checksum").map_err(format)?,
            signature,
        })
    }

    /// Check a received handshake against local policy at time `now`
    /// (Unix seconds).
    pub fn validate(&self, config: &HandshakeConfig, now: u64) -> Result<(), HandshakeError> {
        if self.version != PROTOCOL_VERSION {
            return Err(HandshakeError::InvalidVersion);
        }

        if self.compute_checksum() != self.checksum {
            return Err(HandshakeError::InvalidChecksum);
        }

        if self.timestamp.abs_diff(now) > config.max_clock_drift.as_secs() {
            return Err(HandshakeError::InvalidTimestamp);
        }

        let claims_pubkey = self.flags & flags::PUBKEY != 0;
        match (&self.identity, claims_pubkey) {
            (IdentityClaim::Pubkey(pubkey), true) => {
                if !pubkey.is_valid() {
                    return Err(HandshakeError::InvalidPubkey);
                }
                let signature = self.signature.as_ref().ok_or(HandshakeError::InvalidSignature)?;
                if !pubkey.verify(&self.signed_bytes(), signature) {
                    return Err(HandshakeError::InvalidSignature);
                }
                Ok(())
            }
            (IdentityClaim::PeerId(_), false) if !config.require_authenticated => Ok(()),
            _ => Err(HandshakeError::InvalidPubkey),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_736_870_400;

    fn alice() -> Keypair {
        Keypair::generate_from([0x42; 32])
    }

    #[test]
    fn test_signed_roundtrip_validates() {
        let msg = HandshakeMessage::signed(&alice(), 0, NOW);
        let decoded = HandshakeMessage::decode(&msg.encode()).unwrap();

        assert_eq!(decoded, msg);
        assert_eq!(decoded.identity.pubkey(), Some(alice().pubkey()));
        assert!(decoded.encode().len() <= MAX_HANDSHAKE_SIZE);
        decoded.validate(&HandshakeConfig::default(), NOW).unwrap();
    }

    #[test]
    fn test_anonymous_validates_unless_authentication_required() {
        let peer_id = PeerId::from_pubkey(&Keypair::generate().pubkey());
        let msg = HandshakeMessage::anonymous(peer_id, flags::PUBKEY, NOW);

        assert_eq!(msg.flags & flags::PUBKEY, 0);
        assert!(msg.signature.is_none());
        msg.validate(&HandshakeConfig::default(), NOW).unwrap();

        let strict = HandshakeConfig::default().with_require_authenticated(true);
        assert_eq!(msg.validate(&strict, NOW), Err(HandshakeError::InvalidPubkey));
    }

    #[test]
    fn test_wrong_version() {
        let mut msg = HandshakeMessage::signed(&alice(), 0, NOW);
        msg.version = PROTOCOL_VERSION + 1;
        assert_eq!(
            msg.validate(&HandshakeConfig::default(), NOW),
            Err(HandshakeError::InvalidVersion)
        );
    }

    #[test]
    fn test_version_checked_before_checksum() {
        let mut msg = HandshakeMessage::signed(&alice(), 0, NOW);
        msg.version = 0;
        msg.checksum ^= 1;
        assert_eq!(
            msg.validate(&HandshakeConfig::default(), NOW),
            Err(HandshakeError::InvalidVersion)
        );
    }

    #[test]
    fn test_corrupt_checksum() {
        let mut msg = HandshakeMessage::signed(&alice(), 0, NOW);
        msg.checksum ^= 0xff;
        let decoded = HandshakeMessage::decode(&msg.encode()).unwrap();
        assert_eq!(
            decoded.validate(&HandshakeConfig::default(), NOW),
            Err(HandshakeError::InvalidChecksum)
        );
    }

    #[test]
    fn test_timestamp_window() {
        let config = HandshakeConfig::default();
        let at = |ts| HandshakeMessage::signed(&alice(), 0, ts).validate(&config, NOW);

        assert_eq!(at(NOW - 32), Ok(()));
        assert_eq!(at(NOW + 32), Ok(()));
        assert_eq!(at(NOW - 33), Err(HandshakeError::InvalidTimestamp));
        assert_eq!(at(NOW + 33), Err(HandshakeError::InvalidTimestamp));
    }

    #[test]
    fn test_missing_or_bad_signature() {
        let config = HandshakeConfig::default();

        let mut unsigned = HandshakeMessage::signed(&alice(), 0, NOW);
        unsigned.signature = None;
        assert_eq!(unsigned.validate(&config, NOW), Err(HandshakeError::InvalidSignature));

        // Signed by someone else.
        let mut forged = HandshakeMessage::signed(&alice(), 0, NOW);
        forged.signature = Some(Keypair::generate().sign(&forged.signed_bytes()));
        assert_eq!(forged.validate(&config, NOW), Err(HandshakeError::InvalidSignature));
    }

    #[test]
    fn test_flag_and_claim_must_agree() {
        let config = HandshakeConfig::default();

        // Pubkey flag set but only a peer id claimed.
        let mut msg = HandshakeMessage::anonymous(PeerId::from_bytes([1; 32]), 0, NOW);
        msg.flags |= flags::PUBKEY;
        msg.checksum = msg.compute_checksum();
        assert_eq!(msg.validate(&config, NOW), Err(HandshakeError::InvalidPubkey));

        // Public key claimed without the flag.
        let mut msg = HandshakeMessage::signed(&alice(), 0, NOW);
        msg.flags &= !flags::PUBKEY;
        msg.checksum = msg.compute_checksum();
        assert_eq!(msg.validate(&config, NOW), Err(HandshakeError::InvalidPubkey));
    }

    #[test]
    fn test_off_curve_pubkey() {
        // Find bytes that do not decompress to a curve point.
        let bogus = (0u8..=255)
            .map(|b| Pubkey::from_bytes([b; 32]))
            .find(|pk| !pk.is_valid())
            .expect("some constant byte pattern is off-curve");

        let mut msg = HandshakeMessage::signed(&alice(), 0, NOW);
        msg.identity = IdentityClaim::Pubkey(bogus);
        msg.checksum = msg.compute_checksum();
        assert_eq!(
            msg.validate(&HandshakeConfig::default(), NOW),
            Err(HandshakeError::InvalidPubkey)
        );
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert_eq!(HandshakeMessage::decode(&[]), Err(HandshakeError::InvalidFormat));
        assert_eq!(HandshakeMessage::decode(&[0xa0]), Err(HandshakeError::InvalidFormat));

        // Both identity kinds present.
        let mut entries = HandshakeMessage::signed(&alice(), 0, NOW).body_entries();
        entries.push((keys::PEER_ID, Value::Bytes(vec![0; 32])));
        entries.push((keys::CHECKSUM, Value::Integer(0.into())));
        assert_eq!(
            HandshakeMessage::decode(&canonical::encode_map(entries)),
            Err(HandshakeError::InvalidFormat)
        );

        // Short signature.
        let mut entries = HandshakeMessage::signed(&alice(), 0, NOW).body_entries();
        entries.push((keys::CHECKSUM, Value::Integer(0.into())));
        entries.push((keys::SIGNATURE, Value::Bytes(vec![0; 12])));
        assert_eq!(
            HandshakeMessage::decode(&canonical::encode_map(entries)),
            Err(HandshakeError::InvalidFormat)
        );
    }

    #[test]
    fn test_decode_oversized_version() {
        let mut entries = HandshakeMessage::signed(&alice(), 0, NOW).body_entries();
        entries[0] = (keys::VERSION, Value::Integer(300.into()));
        entries.push((keys::CHECKSUM, Value::Integer(0.into())));
        assert_eq!(
            HandshakeMessage::decode(&canonical::encode_map(entries)),
            Err(HandshakeError::InvalidVersion)
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
                let _ = HandshakeMessage::decode(&bytes);
            }

            #[test]
            fn signed_handshakes_validate(seed in any::<[u8; 32]>(), flags in any::<u32>(), ts in 0u64..=u32::MAX as u64) {
                let msg = HandshakeMessage::signed(&Keypair::generate_from(seed), flags, ts);
                let decoded = HandshakeMessage::decode(&msg.encode()).unwrap();
                prop_assert_eq!(&decoded, &msg);
                prop_assert!(decoded.validate(&HandshakeConfig::default(), ts).is_ok());
            }

            #[test]
            fn flipped_byte_never_validates(seed in any::<[u8; 32]>(), index in any::<prop::sample::Index>()) {
                let msg = HandshakeMessage::signed(&Keypair::generate_from(seed), 0, NOW);
                let mut bytes = msg.encode();
                let i = index.index(bytes.len());
                bytes[i] ^= 0x01;
                if let Ok(decoded) = HandshakeMessage::decode(&bytes) {
                    prop_assert!(decoded.validate(&HandshakeConfig::default(), NOW).is_err());
                }
            }
        }
    }
}
