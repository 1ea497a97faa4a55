//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use murmur_core::clock::now_millis;
use murmur_core::{Contact, Keypair, Message, PeerId, Pubkey};
use murmur_store::MemoryStore;
use murmur_sync::stream::memory::{self, DuplexStream};
use murmur_sync::stream::IoStream;

/// A test fixture with a keypair and memory store.
pub struct TestFixture {
    pub keypair: Keypair,
    pub store: Arc<MemoryStore>,
}

impl TestFixture {
    /// Create a new test fixture with a random keypair.
    pub fn new() -> Self {
        Self {
            keypair: Keypair::generate(),
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// Create with a deterministic keypair from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            keypair: Keypair::generate_from(seed),
            store: Arc::new(MemoryStore::new()),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn peer_id(&self) -> PeerId {
        PeerId::from_pubkey(&self.keypair.pubkey())
    }

    /// This fixture as a contact in someone else's book.
    pub fn contact(&self) -> Contact {
        Contact::new(self.pubkey())
    }

    /// A message stamped now.
    pub fn message(&self, data: &[u8], recipients: Vec<Pubkey>) -> Message {
        Message::new(data.to_vec(), recipients, u64::try_from(now_millis()).unwrap_or(0))
    }

    /// A message addressed to `to`.
    pub fn message_to(&self, to: &TestFixture, data: &[u8]) -> Message {
        self.message(data, vec![to.pubkey()])
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create multiple test fixtures for multi-party tests.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[..8].copy_from_slice(&(i as u64).to_le_bytes());
            TestFixture::with_seed(seed)
        })
        .collect()
}

/// A connected pair of in-memory streams.
pub fn stream_pair() -> (IoStream<DuplexStream>, IoStream<DuplexStream>) {
    memory::pair()
}
