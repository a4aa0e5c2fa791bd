//! Session key derivation.
//!
//! HKDF-SHA256 turns the X25519 shared secret into the 32-byte session key.
//! The client's 16-byte handshake nonce is the salt (zero-padded to 32
//! bytes), so both peers derive the same key and two connections with the
//! same keypairs still diverge.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::crypto::KEY_SIZE;
use crate::error::{Error, Result};

/// HKDF info string binding derived keys to this protocol.
const SESSION_KEY_INFO: &[u8] = b"reflex-session-key";

/// Derive the per-connection session key from a shared secret and the
/// client's handshake nonce.
///
/// The nonce is copied into a 32-byte salt buffer: shorter nonces are
/// zero-padded, longer ones truncated. Both sides must pass the *client's*
/// nonce or the derived keys will not match.
pub fn derive_session_key(shared_secret: &[u8; 32], nonce: &[u8]) -> Result<[u8; KEY_SIZE]> {
    let mut salt = [0u8; 32];
    let n = nonce.len().min(salt.len());
    salt[..n].copy_from_slice(&nonce[..n]);

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared_secret);
    let mut session_key = [0u8; KEY_SIZE];
    hkdf.expand(SESSION_KEY_INFO, &mut session_key)
        .map_err(|_| Error::Hkdf)?;
    Ok(session_key)
}
