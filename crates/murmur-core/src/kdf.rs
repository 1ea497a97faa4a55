//! Ratcheting key-derivation chain.
//!
//! Each step runs HKDF-SHA512 extract over the current chain key with a
//! fixed input and splits the 64-byte output: the first half replaces the
//! chain key, the second half is handed out as a message key. The old
//! chain key is wiped, so a leaked message key or later state cannot be
//! walked backwards.

use hkdf::Hkdf;
use sha2::Sha512;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Fixed input mixed into every step.
const CHAIN_INPUT: [u8; 2] = [0x13, 0x37];

/// Size of chain and message keys.
pub const KEY_SIZE: usize = 32;

/// A per-message key produced by [`KdfChain::next_key`].
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MessageKey([u8; KEY_SIZE]);

impl MessageKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MessageKey(<redacted>)")
    }
}

/// A one-way chain of derived keys.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KdfChain {
    root_key: Vec<u8>,
    chain_key: Vec<u8>,
    #[zeroize(skip)]
    n: u64,
}

impl KdfChain {
    /// Start a chain from `seed`. The seed becomes both root and first
    /// chain key.
    pub fn new(seed: &[u8]) -> Self {
        Self {
            root_key: seed.to_vec(),
            chain_key: seed.to_vec(),
            n: 0,
        }
    }

    /// Number of keys derived so far.
    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn root_key(&self) -> &[u8] {
        &self.root_key
    }

    /// Advance the chain and return the next message key.
    pub fn next_key(&mut self) -> MessageKey {
        let (mut prk, _) = Hkdf::<Sha512>::extract(Some(self.chain_key.as_slice()), &CHAIN_INPUT);
        let mut output = Zeroizing::new([0u8; 2 * KEY_SIZE]);
        output.copy_from_slice(&prk);
        prk.as_mut_slice().zeroize();

        self.chain_key.zeroize();
        self.chain_key = output[..KEY_SIZE].to_vec();

        let mut message_key = [0u8; KEY_SIZE];
        message_key.copy_from_slice(&output[KEY_SIZE..]);
        self.n += 1;

        MessageKey(message_key)
    }
}

impl fmt::Debug for KdfChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KdfChain").field("n", &self.n).finish_non_exhaustive()
    }
}
