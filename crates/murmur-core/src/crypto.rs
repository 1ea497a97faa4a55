//! Peer identity keys.
//!
//! Wraps Ed25519 signing keys with strong types. Private keys never leave
//! [`Privkey`] except through zeroizing containers.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::StaticSecret;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CoreError, Result};
use crate::seal;

/// Size of a public key in bytes.
pub const PUBKEY_SIZE: usize = 32;
/// Size of a private key (seed) in bytes.
pub const PRIVKEY_SIZE: usize = 32;
/// Size of a detached signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// A 32-byte Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pubkey(pub [u8; PUBKEY_SIZE]);

impl Pubkey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; PUBKEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; PUBKEY_SIZE] = bytes.try_into().map_err(|_| CoreError::InvalidLength {
            expected: PUBKEY_SIZE,
            got: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; PUBKEY_SIZE] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        Self::from_slice(&hex::decode(s)?)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self> {
        Self::from_slice(&BASE64.decode(s)?)
    }

    /// Whether the bytes decode to a point on the curve.
    pub fn is_valid(&self) -> bool {
        self.verifying_key().is_ok()
    }

    /// Verify a detached signature over `message`.
    ///
    /// Uses strict verification: small-order keys and non-canonical
    /// signatures are rejected.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(key) = self.verifying_key() else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        key.verify_strict(message, &sig).is_ok()
    }

    /// Seal `message` so only the holder of the matching private key can
    /// open it. The sender stays anonymous.
    pub fn encrypt_to(&self, message: &[u8]) -> Result<Vec<u8>> {
        seal::seal(self, message)
    }

    pub(crate) fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)
    }

    /// The X25519 (Montgomery) form of this key, used for key agreement.
    pub(crate) fn to_x25519(&self) -> Result<x25519_dalek::PublicKey> {
        let key = self.verifying_key()?;
        Ok(x25519_dalek::PublicKey::from(key.to_montgomery().to_bytes()))
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for Pubkey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; PUBKEY_SIZE]> for Pubkey {
    fn from(bytes: [u8; PUBKEY_SIZE]) -> Self {
        Self(bytes)
    }
}

/// A 64-byte Ed25519 detached signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; SIGNATURE_SIZE]);

impl Signature {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; SIGNATURE_SIZE] =
            bytes.try_into().map_err(|_| CoreError::InvalidLength {
                expected: SIGNATURE_SIZE,
                got: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// An Ed25519 private key.
///
/// Move-only. The key material is zeroed when the value is dropped.
pub struct Privkey {
    signing_key: SigningKey,
}

impl Privkey {
    /// Build a private key from its 32-byte seed. The source buffer is
    /// zeroed.
    pub fn from_bytes(bytes: &mut [u8; PRIVKEY_SIZE]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        bytes.zeroize();
        Self { signing_key }
    }

    pub fn from_base64(s: &str) -> Result<Self> {
        let decoded = Zeroizing::new(BASE64.decode(s)?);
        if decoded.len() != PRIVKEY_SIZE {
            return Err(CoreError::InvalidLength {
                expected: PRIVKEY_SIZE,
                got: decoded.len(),
            });
        }
        let mut seed = Zeroizing::new([0u8; PRIVKEY_SIZE]);
        seed.copy_from_slice(&decoded);
        Ok(Self::from_bytes(&mut seed))
    }

    pub fn to_base64(&self) -> Zeroizing<String> {
        let seed = Zeroizing::new(self.signing_key.to_bytes());
        Zeroizing::new(BASE64.encode(*seed))
    }

    /// Raw seed bytes, in a buffer that zeroes itself on drop.
    pub fn to_bytes(&self) -> Zeroizing<[u8; PRIVKEY_SIZE]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    /// Derive the public key.
    pub fn public_key(&self) -> Pubkey {
        Pubkey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }

    /// Open a sealed box addressed to this key.
    ///
    /// Returns `None` if the ciphertext is malformed or fails
    /// authentication; never returns partial plaintext.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Option<Vec<u8>> {
        seal::open(self, ciphertext)
    }

    /// The X25519 secret matching [`Pubkey::to_x25519`].
    pub(crate) fn to_x25519(&self) -> StaticSecret {
        let scalar = Zeroizing::new(self.signing_key.to_scalar_bytes());
        StaticSecret::from(*scalar)
    }
}

impl fmt::Debug for Privkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Privkey(<redacted>)")
    }
}

/// A peer identity: public key plus the private key that signs for it.
pub struct Keypair {
    pubkey: Pubkey,
    privkey: Privkey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let signing_key = SigningKey::generate(&mut rng);
        Self::from_privkey(Privkey { signing_key })
    }

    /// Derive a keypair deterministically from a 32-byte seed.
    pub fn generate_from(seed: [u8; PRIVKEY_SIZE]) -> Self {
        let mut seed = Zeroizing::new(seed);
        Self::from_privkey(Privkey::from_bytes(&mut seed))
    }

    pub fn from_privkey(privkey: Privkey) -> Self {
        Self {
            pubkey: privkey.public_key(),
            privkey,
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.pubkey
    }

    pub fn privkey(&self) -> &Privkey {
        &self.privkey
    }

    /// Sign a message with the private half.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.privkey.sign(message)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.pubkey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_sign_verify() {
        let keypair = Keypair::generate();
        let message = b"hello world";
        let signature = keypair.sign(message);

        assert!(keypair.pubkey().verify(message, &signature));
        assert!(!keypair.pubkey().verify(b"hello worlD", &signature));

        let other = Keypair::generate();
        assert!(!other.pubkey().verify(message, &signature));
    }

    #[test]
    fn test_keypair_deterministic_from_seed() {
        let kp1 = Keypair::generate_from([0x42; 32]);
        let kp2 = Keypair::generate_from([0x42; 32]);
        assert_eq!(kp1.pubkey(), kp2.pubkey());

        let kp3 = Keypair::generate_from([0x43; 32]);
        assert_ne!(kp1.pubkey(), kp3.pubkey());
    }

    #[test]
    fn test_known_public_key() {
        let keypair = Keypair::generate_from([0x42; 32]);
        assert_eq!(
            keypair.pubkey().to_hex(),
            "2152f8d19b791d24453242e15f2eab6cb7cffa7b6a5ed30097960e069881db12"
        );
    }

    #[test]
    fn test_privkey_from_bytes_zeroes_source() {
        let mut seed = [0x07u8; 32];
        let privkey = Privkey::from_bytes(&mut seed);
        assert_eq!(seed, [0u8; 32]);
        assert_eq!(*privkey.to_bytes(), [0x07u8; 32]);
    }

    #[test]
    fn test_base64_roundtrips() {
        let keypair = Keypair::generate();

        let pk = keypair.pubkey();
        assert_eq!(Pubkey::from_base64(&pk.to_base64()).unwrap(), pk);
        assert_eq!(Pubkey::from_hex(&pk.to_hex()).unwrap(), pk);

        let encoded = keypair.privkey().to_base64();
        let restored = Privkey::from_base64(&encoded).unwrap();
        assert_eq!(restored.public_key(), pk);
    }

    #[test]
    fn test_base64_rejects_wrong_length() {
        let short = BASE64.encode([1u8; 16]);
        assert!(matches!(
            Pubkey::from_base64(&short),
            Err(CoreError::InvalidLength { expected: 32, got: 16 })
        ));
        assert!(Privkey::from_base64(&short).is_err());
        assert!(Pubkey::from_base64("not base64!").is_err());
    }

    #[test]
    fn test_debug_hides_private_key() {
        let keypair = Keypair::generate_from([0x42; 32]);
        let debug = format!("{:?}", keypair.privkey());
        assert_eq!(debug, "Privkey(<redacted>)");
        assert!(!format!("{:?}", keypair).contains("4242"));
    }

    #[test]
    fn test_invalid_pubkey_never_verifies() {
        let keypair = Keypair::generate();
        let signature = keypair.sign(b"msg");
        // Bytes unrelated to the signer.
        let bogus = Pubkey([0xff; 32]);
        assert!(!bogus.verify(b"msg", &signature));
    }
}
