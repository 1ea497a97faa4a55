//! Golden vectors for cross-implementation verification.
//!
//! Every murmur implementation must produce identical:
//! - public keys, peer ids and signatures for a seed
//! - message key chains
//! - CRC-64 checksums and varuint encodings
//! - multiaddr binary forms
//! - message header and handshake bytes

use murmur::core::{seal, varint, Multiaddr, PeerId};
use murmur::sync::{HandshakeConfig, HandshakeMessage};
use murmur::Keypair;
use murmur_testkit::vectors::{self, identity_vectors, verify_all_vectors};

#[test]
fn test_every_vector_matches() {
    let results = verify_all_vectors();
    assert!(!results.is_empty());
    let failed: Vec<_> = results.iter().filter(|(_, ok, _)| !ok).collect();
    assert!(failed.is_empty(), "mismatched vectors: {failed:#?}");
}

#[test]
fn test_peer_id_text_forms() {
    let v = &identity_vectors()[0];
    let peer = PeerId::from_pubkey(&Keypair::generate_from(v.seed).pubkey());

    assert_eq!(peer.to_string(), v.peer_id);
    assert_eq!(peer.to_base64(), "MJfi3uLLSjS1OEDNtwWu1xBnw29o2w4PVZw/P6BDMV8=");
    assert_eq!(v.peer_id.parse::<PeerId>().unwrap(), peer);
}

#[test]
fn test_multiaddr_text_and_binary_agree() {
    let addr: Multiaddr = vectors::MULTIADDR_TEXT.parse().unwrap();
    let bytes = hex::decode(vectors::MULTIADDR_BYTES).unwrap();

    assert_eq!(Multiaddr::from_bytes(&bytes).unwrap(), addr);
    assert_eq!(addr.to_string(), vectors::MULTIADDR_TEXT);
}

#[test]
fn test_varuint_decodes_vectors() {
    for (value, encoded) in vectors::VARUINT_VECTORS {
        let bytes = hex::decode(encoded).unwrap();
        assert_eq!(varint::decode(&bytes).unwrap(), (value, bytes.len()));
    }
}

#[test]
fn test_golden_handshake_validates_at_its_time() {
    let bytes = hex::decode(vectors::HANDSHAKE_BYTES).unwrap();
    let msg = HandshakeMessage::decode(&bytes).unwrap();
    let config = HandshakeConfig::default();

    assert_eq!(msg.timestamp, vectors::HANDSHAKE_TIMESTAMP);
    assert!(msg.validate(&config, vectors::HANDSHAKE_TIMESTAMP).is_ok());
    assert!(msg.validate(&config, vectors::HANDSHAKE_TIMESTAMP + 32).is_ok());
    assert!(msg.validate(&config, vectors::HANDSHAKE_TIMESTAMP + 33).is_err());
}

#[test]
fn test_sealed_box_is_randomized_but_opens() {
    let bob = Keypair::generate_from([0x01; 32]);
    let a = seal::seal(&bob.pubkey(), b"same").unwrap();
    let b = seal::seal(&bob.pubkey(), b"same").unwrap();

    assert_ne!(a, b);
    assert_eq!(a.len(), 4 + seal::SEAL_OVERHEAD);
    assert_eq!(seal::open(bob.privkey(), &a).as_deref(), Some(&b"same"[..]));
    assert_eq!(seal::open(bob.privkey(), &b).as_deref(), Some(&b"same"[..]));
}
