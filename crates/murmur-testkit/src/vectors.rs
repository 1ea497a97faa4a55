//! Golden test vectors for deterministic verification.
//!
//! Every murmur implementation must produce these exact bytes, or peers
//! will not interoperate.

use murmur_core::{crc64, varint, KdfChain, Keypair, MessageHeader, Multiaddr, PeerId, Uuid};
use murmur_sync::HandshakeMessage;

/// An identity derived from a fixed seed.
#[derive(Debug, Clone)]
pub struct IdentityVector {
    pub name: &'static str,
    pub seed: [u8; 32],
    /// Ed25519 public key (hex).
    pub pubkey: &'static str,
    /// SHA-256 of the public key (hex).
    pub peer_id: &'static str,
    /// Signature over `b"hello"` (hex).
    pub signature_hello: &'static str,
}

pub fn identity_vectors() -> Vec<IdentityVector> {
    vec![
        IdentityVector {
            name: "seed 0x42",
            seed: [0x42; 32],
            pubkey: "2152f8d19b791d24453242e15f2eab6cb7cffa7b6a5ed30097960e069881db12",
            peer_id: "3097e2dee2cb4a34b53840cdb705aed71067c36f68db0e0f559c3f3fa043315f",
            signature_hello: "fa10ea646d7ee80994bdddd03942479b61a9d54962cffe3e629537266b8adc46\
                              b5a60b204f1798bf32398bc2d4ef8d791a4e4ae7c39eb43e83563ce67d39e405",
        },
        IdentityVector {
            name: "zero seed",
            seed: [0x00; 32],
            pubkey: "3b6a27bcceb6a42d62a3a8d02a6f0d73653215771de243a63ac048a18b59da29",
            peer_id: "139e3940e64b5491722088d9a0d741628fc826e09475d341a780acde3c4b8070",
            signature_hello: "e25c8723d039fe8f45d6c9d6a8917fa91bc754913cd596fd358a493a21a3cb59\
                              0a6537babc7df0400ab61a05589c9c36b65a143878cb0341d4e9e48419c4370d",
        },
        IdentityVector {
            name: "seed 0x01",
            seed: [0x01; 32],
            pubkey: "8a88e3dd7409f195fd52db2d3cba5d72ca6709bf1d94121bf3748801b40f6f5c",
            peer_id: "34750f98bd59fcfc946da45aaabe933be154a4b5094e1c4abf42866505f3c97e",
            signature_hello: "e1430c6ebd0d53573b5c803452174f8991ef5955e0906a09e8fdc7310459e9c8\
                              2a402526748c3431fe7f0e5faafbf7e703234789734063ee42be17af16438d08",
        },
    ]
}

/// First three keys of the chain seeded with `[0x42; 32]`.
pub const KDF_SEED: [u8; 32] = [0x42; 32];
pub const KDF_KEYS: [&str; 3] = [
    "c89093eb43d0ac72e1429dcc4a936048868e45d04f0f41e2b7bcbd8d67cacbd1",
    "84a7940e5b02e104d651b47324d37499ee8308e45e423bbc39fba673727bc2ab",
    "9c22a9e9b4ed6db6dd4d4244bf3668373dee2c3445a49c5497f0a172d0ed2dfa",
];

/// CRC-64 check value over `b"123456789"`.
pub const CRC64_CHECK: u64 = 0xe9c6_d914_c4b8_d9ca;

/// `(value, encoding hex)`.
pub const VARUINT_VECTORS: [(u64, &str); 4] = [
    (0, "00"),
    (150, "9601"),
    (300, "ac02"),
    (u64::MAX, "ffffffffffffffffff01"),
];

pub const MULTIADDR_TEXT: &str = "/btle/7d444840-9dc0-11d1-b245-5ffdce74fad2";
pub const MULTIADDR_BYTES: &str = "96017d4448409dc011d1b2455ffdce74fad2";

/// Header of a message carrying `b"123456789"` created at this time.
pub const HEADER_TIMESTAMP: u64 = 1_736_870_400_000;
pub const HEADER_BYTES: &str = "a3001b00000194658b1000011be9c6d914c4b8d9ca0209";

/// Signed handshake from seed `[0x42; 32]` at this Unix second, no extra
/// flags.
pub const HANDSHAKE_SEED: [u8; 32] = [0x42; 32];
pub const HANDSHAKE_TIMESTAMP: u64 = 1_736_870_400;
pub const HANDSHAKE_CHECKSUM: u64 = 0x7f8b_3ff4_5c2d_df82;
pub const HANDSHAKE_BYTES: &str = "a600010101025820\
    2152f8d19b791d24453242e15f2eab6cb7cffa7b6a5ed30097960e069881db12\
    041a67868a00051b7f8b3ff45c2ddf82065840\
    e839ed7129e443f7c99753b388dfd8a8ebe671469533a4abba17ce8e387df6e8\
    fda6a479073c6fdd5e561cbbddee7d692f1e77265d3b79ac179f889eb1b2ef0e";

/// Check every vector against this build. Returns `(name, matches, got)`.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let mut out = Vec::new();
    let mut check = |name: String, expected: &str, got: String| {
        out.push((name, expected == got, got));
    };

    for v in identity_vectors() {
        let keypair = Keypair::generate_from(v.seed);
        let pubkey = keypair.pubkey();
        check(format!("{} pubkey", v.name), v.pubkey, pubkey.to_hex());
        check(
            format!("{} peer id", v.name),
            v.peer_id,
            PeerId::from_pubkey(&pubkey).to_hex(),
        );
        check(
            format!("{} signature", v.name),
            v.signature_hello,
            keypair.sign(b"hello").to_hex(),
        );
    }

    let mut chain = KdfChain::new(&KDF_SEED);
    for (i, expected) in KDF_KEYS.into_iter().enumerate() {
        check(format!("kdf key {}", i + 1), expected, hex::encode(chain.next_key().as_bytes()));
    }

    check(
        "crc64 check".into(),
        format!("{CRC64_CHECK:016x}").as_str(),
        format!("{:016x}", crc64::crc64(b"123456789")),
    );

    for (value, expected) in VARUINT_VECTORS {
        check(format!("varuint {value}"), expected, hex::encode(varint::encode(value)));
    }

    match MULTIADDR_TEXT.parse::<Multiaddr>() {
        Ok(addr) => check("multiaddr bytes".into(), MULTIADDR_BYTES, hex::encode(addr.to_bytes())),
        Err(err) => check("multiaddr bytes".into(), MULTIADDR_BYTES, err.to_string()),
    }

    let header = MessageHeader {
        timestamp: HEADER_TIMESTAMP,
        checksum: crc64::crc64(b"123456789"),
        size: 9,
    };
    check("message header".into(), HEADER_BYTES, hex::encode(header.encode()));

    let handshake = HandshakeMessage::signed(
        &Keypair::generate_from(HANDSHAKE_SEED),
        0,
        HANDSHAKE_TIMESTAMP,
    );
    check(
        "handshake checksum".into(),
        format!("{HANDSHAKE_CHECKSUM:016x}").as_str(),
        format!("{:016x}", handshake.checksum),
    );
    check("handshake bytes".into(), HANDSHAKE_BYTES, hex::encode(handshake.encode()));

    out
}

/// The fixed UUID used by [`MULTIADDR_TEXT`].
pub fn multiaddr_uuid() -> Uuid {
    Uuid::from_u128(0x7d444840_9dc0_11d1_b245_5ffdce74fad2)
}
