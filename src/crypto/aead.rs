//! Authenticated encryption for the frame channel.
//!
//! ChaCha20-Poly1305 with a per-direction counter nonce. The cipher is fast
//! in software, constant-time, and widely deployed (TLS 1.3, WireGuard).

use chacha20poly1305::{
    aead::{Aead as AeadTrait, KeyInit},
    ChaCha20Poly1305,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{KEY_SIZE, NONCE_SIZE};
use crate::error::{Error, Result};

/// A symmetric key for AEAD operations.
///
/// Automatically zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AeadKey([u8; KEY_SIZE]);

impl AeadKey {
    /// Create a new AEAD key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a key from a slice, rejecting any length other than 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| Error::BadKey(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    ///
    /// Handle with care - this is secret key material.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// A nonce (number used once) for AEAD operations.
///
/// Each direction of a session keeps its own monotonic counter; the counter
/// is the sole nonce input, so uniqueness follows from monotonicity.
#[derive(Clone, Copy, Debug)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Create a nonce from a 64-bit counter value.
    ///
    /// The counter occupies the last 8 bytes big-endian; the first 4 bytes
    /// are zero.
    pub fn from_counter(counter: u64) -> Self {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[4..12].copy_from_slice(&counter.to_be_bytes());
        Self(nonce)
    }

    /// Get the raw nonce bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

impl From<u64> for Nonce {
    fn from(counter: u64) -> Self {
        Self::from_counter(counter)
    }
}

/// ChaCha20-Poly1305 AEAD cipher bound to one session key.
pub struct Aead {
    cipher: ChaCha20Poly1305,
}

impl Aead {
    /// Create a new AEAD instance with the given key.
    pub fn new(key: &AeadKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(key.as_bytes().into()),
        }
    }

    /// Encrypt plaintext, returning ciphertext with the 16-byte tag appended.
    ///
    /// Reflex frames carry no associated data.
    pub fn seal(&self, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.cipher
            .encrypt(nonce.as_bytes().into(), plaintext)
            .map_err(|_| Error::AeadOpen)
    }

    /// Decrypt ciphertext produced by [`seal`](Self::seal).
    ///
    /// # Errors
    ///
    /// Returns [`Error::AeadOpen`] if authentication fails (wrong key,
    /// wrong nonce, or tampered data).
    pub fn open(&self, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.cipher
            .decrypt(nonce.as_bytes().into(), ciphertext)
            .map_err(|_| Error::AeadOpen)
    }
}
