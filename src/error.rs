//! Error types for the Reflex protocol.

use thiserror::Error;

/// Result type alias for Reflex operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during Reflex operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Input shorter than the fixed wire layout requires
    #[error("truncated input: expected {expected} bytes, got {actual}")]
    Short { expected: usize, actual: usize },

    /// Handshake magic bytes did not match
    #[error("invalid handshake magic")]
    BadMagic,

    /// Handshake timestamp outside the accepted drift window
    #[error("handshake timestamp out of range")]
    StaleTimestamp,

    /// Handshake nonce seen before
    #[error("replay detected: duplicate handshake nonce")]
    Replay,

    /// Presented UUID matched no configured client
    #[error("authentication failed: unknown client")]
    AuthUnknown,

    /// X25519 key exchange failed
    #[error("key exchange failed: {0}")]
    KeyExchange(String),

    /// HKDF expansion failed
    #[error("session key derivation failed")]
    Hkdf,

    /// Session key has the wrong length
    #[error("invalid session key length: expected 32 bytes, got {0}")]
    BadKey(usize),

    /// AEAD authentication failed on an inbound frame
    #[error("frame decryption failed")]
    AeadOpen,

    /// Frame carried an unrecognized type byte
    #[error("unknown frame type: 0x{0:02x}")]
    UnknownFrame(u8),

    /// Destination encoding was malformed
    #[error("invalid destination: {0}")]
    BadDestination(String),

    /// The upstream link could not be established
    #[error("dispatch failed: {0}")]
    DispatchFailed(String),

    /// Could not reach the Reflex server after retries
    #[error("failed to dial server: {0}")]
    DialFailed(String),

    /// Handshake or idle deadline expired
    #[error("connection timed out")]
    Timeout,

    /// Network I/O error
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new key exchange error
    pub fn key_exchange(msg: impl Into<String>) -> Self {
        Error::KeyExchange(msg.into())
    }

    /// Create a new destination error
    pub fn destination(msg: impl Into<String>) -> Self {
        Error::BadDestination(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Check whether an inbound connection failing with this error may be
    /// relayed to the fallback origin instead of being closed.
    ///
    /// Replay, stale-timestamp, and cryptographic failures are never
    /// forwarded; an active prober must not learn which stage rejected it
    /// beyond what the fallback origin itself reveals.
    pub fn fallback_eligible(&self) -> bool {
        matches!(
            self,
            Error::Short { .. }
                | Error::BadMagic
                | Error::AuthUnknown
                | Error::Io(_)
                | Error::Timeout
        )
    }
}
