//! # Murmur Core
//!
//! Pure primitives for murmur: peer identity, sealed boxes, the message
//! key chain, wire codecs and the message/contact model.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Keypair`] - Ed25519 identity; [`Pubkey`] doubles as a sealed-box recipient
//! - [`PeerId`] - SHA-256 of a public key, the stable per-peer map key
//! - [`Message`] - payload plus header (timestamp, CRC-64, size)
//! - [`Contact`] - a known peer and when it was last synced
//! - [`Multiaddr`] - `/btle/<uuid>[/<version>]` addresses
//!
//! ## Canonicalization
//!
//! Signed and checksummed structures are encoded with deterministic CBOR.
//! See the [`canonical`] module.

pub mod canonical;
pub mod clock;
pub mod contact;
pub mod crc64;
pub mod crypto;
pub mod error;
pub mod kdf;
pub mod message;
pub mod multiaddr;
pub mod peer_id;
pub mod seal;
pub mod semver;
pub mod varint;

pub use contact::Contact;
pub use crypto::{Keypair, Privkey, Pubkey, Signature};
pub use error::{CoreError, Result, WireError};
pub use kdf::{KdfChain, MessageKey};
pub use message::{Message, MessageHeader, MessageId};
pub use multiaddr::{Multiaddr, Protocol};
pub use peer_id::PeerId;
pub use semver::SemanticVersion;
pub use uuid::Uuid;
