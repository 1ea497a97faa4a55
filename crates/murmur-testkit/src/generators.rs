//! Proptest generators for property-based testing.

use proptest::prelude::*;

use murmur_core::{
    Contact, Keypair, Message, MessageHeader, Multiaddr, PeerId, Pubkey, SemanticVersion, Uuid,
};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(Keypair::generate_from)
}

/// Generate a valid public key.
pub fn pubkey() -> impl Strategy<Value = Pubkey> {
    keypair().prop_map(|kp| kp.pubkey())
}

pub fn peer_id() -> impl Strategy<Value = PeerId> {
    any::<[u8; 32]>().prop_map(PeerId::from_bytes)
}

pub fn uuid() -> impl Strategy<Value = Uuid> {
    any::<u128>().prop_map(Uuid::from_u128)
}

pub fn version() -> impl Strategy<Value = SemanticVersion> {
    (0u32..100, 0u32..100, 0u32..1000).prop_map(|(a, b, c)| SemanticVersion::new(a, b, c))
}

/// A bluetooth address, with a version half of the time.
pub fn multiaddr() -> impl Strategy<Value = Multiaddr> {
    (uuid(), proptest::option::of(version())).prop_map(|(uuid, version)| {
        let addr = Multiaddr::bluetooth(uuid);
        match version {
            Some(v) => addr.with_version(v),
            None => addr,
        }
    })
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a reasonable millisecond timestamp.
pub fn timestamp() -> impl Strategy<Value = u64> {
    0u64..=4_102_444_800_000
}

pub fn header() -> impl Strategy<Value = MessageHeader> {
    (any::<u64>(), any::<u64>(), any::<u32>()).prop_map(|(timestamp, checksum, size)| {
        MessageHeader {
            timestamp,
            checksum,
            size,
        }
    })
}

/// An intact message with up to three recipients.
pub fn message() -> impl Strategy<Value = Message> {
    (
        payload(512),
        prop::collection::vec(pubkey(), 0..=3),
        timestamp(),
    )
        .prop_map(|(data, recipients, ts)| Message::new(data, recipients, ts))
}

pub fn contact() -> impl Strategy<Value = Contact> {
    (
        pubkey(),
        proptest::option::of("[a-z]{1,12}"),
        prop::collection::vec(multiaddr(), 0..=2),
        0i64..=i64::MAX / 2,
    )
        .prop_map(|(pk, name, addrs, last_sync)| {
            let mut contact = Contact::new(pk);
            contact.name = name;
            for addr in addrs {
                contact.add_address(addr);
            }
            contact.last_sync = last_sync;
            contact
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_message_id_deterministic(msg in message()) {
            let copy = Message::from_parts(msg.header, msg.data.clone());
            prop_assert_eq!(msg.id(), copy.id());
            prop_assert!(copy.is_intact());
        }

        #[test]
        fn test_message_id_unique_with_different_payload(
            p1 in payload(100),
            p2 in payload(100),
            ts in timestamp(),
        ) {
            prop_assume!(p1 != p2);
            let m1 = Message::new(p1, vec![], ts);
            let m2 = Message::new(p2, vec![], ts);
            prop_assert_ne!(m1.id(), m2.id());
        }

        #[test]
        fn test_header_decodes_what_it_encodes(h in header()) {
            prop_assert_eq!(MessageHeader::decode(&h.encode()), Ok(h));
        }

        #[test]
        fn test_contact_peer_id_tracks_pubkey(c in contact()) {
            prop_assert!(c.peer_id().matches(&c.pubkey));
        }
    }
}
