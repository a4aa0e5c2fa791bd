//! Cryptographic primitives for Reflex.
//!
//! This module provides:
//! - X25519 ephemeral key agreement
//! - ChaCha20-Poly1305 AEAD encryption
//! - HKDF-SHA256 session key derivation
//! - Secure random number generation
//!
//! Secret material is zeroized on drop where the type owns it.

mod aead;
mod kdf;
mod keys;
mod random;

pub use aead::{Aead, AeadKey, Nonce};
pub use kdf::derive_session_key;
pub use keys::{derive_shared, generate_keypair};
pub use random::{random_padding, SecureRandom};

/// Size of symmetric keys in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of AEAD nonce in bytes (96 bits for ChaCha20-Poly1305)
pub const NONCE_SIZE: usize = 12;

/// Size of AEAD authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of X25519 public and private keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of the handshake nonce used as HKDF salt
pub const HANDSHAKE_NONCE_SIZE: usize = 16;
