//! X25519 ephemeral key agreement.
//!
//! Reflex uses one ephemeral keypair per connection on each side. The raw
//! scalar-multiplication API is used instead of the dalek secret wrappers
//! because the private key bytes appear verbatim inside the fixed-layout
//! handshake derivation and must match the wire spec's clamping exactly.

use x25519_dalek::{x25519, X25519_BASEPOINT_BYTES};
use zeroize::Zeroizing;

use crate::crypto::{SecureRandom, PUBLIC_KEY_SIZE};
use crate::error::{Error, Result};

/// Generate a fresh ephemeral X25519 keypair.
///
/// The private scalar is clamped per the Curve25519 spec before the public
/// key is derived from the basepoint.
pub fn generate_keypair() -> (Zeroizing<[u8; PUBLIC_KEY_SIZE]>, [u8; PUBLIC_KEY_SIZE]) {
    let mut private = Zeroizing::new(SecureRandom::bytes::<PUBLIC_KEY_SIZE>());
    private[0] &= 248;
    private[31] &= 127;
    private[31] |= 64;

    let public = x25519(*private, X25519_BASEPOINT_BYTES);
    (private, public)
}

/// Compute the X25519 shared secret with a peer's public key.
///
/// An all-zero result means the peer supplied a low-order point and
/// contributed nothing to the exchange; such keys are rejected.
pub fn derive_shared(
    private: &[u8; PUBLIC_KEY_SIZE],
    peer_public: &[u8; PUBLIC_KEY_SIZE],
) -> Result<[u8; PUBLIC_KEY_SIZE]> {
    let shared = x25519(*private, *peer_public);
    if shared == [0u8; PUBLIC_KEY_SIZE] {
        return Err(Error::key_exchange("low-order peer public key"));
    }
    Ok(shared)
}
