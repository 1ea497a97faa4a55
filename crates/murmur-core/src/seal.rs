//! Anonymous sealed boxes.
//!
//! Layout: `ephemeral_pub (32) || ChaCha20-Poly1305(ciphertext || tag)`.
//!
//! The sender generates a one-time X25519 key, agrees a secret with the
//! recipient's X25519 form of their Ed25519 key, and derives a single-use
//! symmetric key from it. Nothing identifies the sender.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::Zeroizing;

use crate::crypto::{Privkey, Pubkey};
use crate::error::{CoreError, Result};

/// Bytes added to a plaintext by [`seal`].
pub const SEAL_OVERHEAD: usize = EPHEMERAL_LEN + TAG_LEN;

const EPHEMERAL_LEN: usize = 32;
const TAG_LEN: usize = 16;
const KEY_CONTEXT: &str = "murmur sealed-box v1 key";

/// Encrypt `plaintext` to `recipient`.
pub fn seal(recipient: &Pubkey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let recipient_x = recipient.to_x25519()?;

    let ephemeral = EphemeralSecret::random_from_rng(rand::thread_rng());
    let ephemeral_pub = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&recipient_x);

    let key = derive_key(shared.as_bytes(), ephemeral_pub.as_bytes(), recipient_x.as_bytes());
    let cipher = ChaCha20Poly1305::new_from_slice(&key[..]).map_err(|_| CoreError::Encryption)?;
    // Each key seals exactly one message, so the nonce can stay fixed.
    let ciphertext = cipher
        .encrypt(&Nonce::default(), plaintext)
        .map_err(|_| CoreError::Encryption)?;

    let mut out = Vec::with_capacity(EPHEMERAL_LEN + ciphertext.len());
    out.extend_from_slice(ephemeral_pub.as_bytes());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a sealed box with the recipient's private key.
pub fn open(recipient: &Privkey, sealed: &[u8]) -> Option<Vec<u8>> {
    if sealed.len() < SEAL_OVERHEAD {
        return None;
    }
    let (ephemeral_bytes, ciphertext) = sealed.split_at(EPHEMERAL_LEN);
    let ephemeral_arr: [u8; EPHEMERAL_LEN] = ephemeral_bytes.try_into().ok()?;
    let ephemeral_pub = PublicKey::from(ephemeral_arr);

    let secret = recipient.to_x25519();
    let recipient_x = PublicKey::from(&secret);
    let shared = secret.diffie_hellman(&ephemeral_pub);
    if !shared.was_contributory() {
        return None;
    }

    let key = derive_key(shared.as_bytes(), ephemeral_pub.as_bytes(), recipient_x.as_bytes());
    let cipher = ChaCha20Poly1305::new_from_slice(&key[..]).ok()?;
    cipher.decrypt(&Nonce::default(), ciphertext).ok()
}

fn derive_key(shared: &[u8; 32], ephemeral: &[u8; 32], recipient: &[u8; 32]) -> Zeroizing<[u8; 32]> {
    let mut hasher = blake3::Hasher::new_derive_key(KEY_CONTEXT);
    hasher.update(shared);
    hasher.update(ephemeral);
    hasher.update(recipient);
    Zeroizing::new(*hasher.finalize().as_bytes())
}
