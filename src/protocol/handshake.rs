//! Handshake message construction, parsing, and validation.
//!
//! The client handshake is a single 76-byte record:
//!
//! ```text
//! offset  0   4          36        52          60       76
//!         | magic | public_key | user_id | timestamp | nonce |
//! ```
//!
//! The server answers with 64 bytes: its ephemeral public key followed by a
//! reserved 32-byte policy grant (currently zero). All integers big-endian.

use std::time::{SystemTime, UNIX_EPOCH};

use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::crypto::{HANDSHAKE_NONCE_SIZE, PUBLIC_KEY_SIZE};
use crate::error::{Error, Result};

/// Magic bytes opening every client handshake ("RFXL").
pub const REFLEX_MAGIC: u32 = 0x5246_584C;

/// Wire size of the client handshake.
pub const CLIENT_HANDSHAKE_SIZE: usize = 4 + PUBLIC_KEY_SIZE + 16 + 8 + HANDSHAKE_NONCE_SIZE;

/// Wire size of the server handshake.
pub const SERVER_HANDSHAKE_SIZE: usize = PUBLIC_KEY_SIZE + 32;

/// Maximum accepted clock drift for handshake timestamps, in seconds.
pub const MAX_TIMESTAMP_DRIFT_SECS: i64 = 120;

/// Client-side handshake data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHandshake {
    /// Client's ephemeral X25519 public key
    pub public_key: [u8; PUBLIC_KEY_SIZE],
    /// Client identity
    pub user_id: Uuid,
    /// Unix timestamp (seconds) at send time
    pub timestamp: i64,
    /// Random nonce; HKDF salt and replay-tracker key
    pub nonce: [u8; HANDSHAKE_NONCE_SIZE],
}

impl ClientHandshake {
    /// Serialize into the fixed wire layout.
    pub fn marshal(&self) -> [u8; CLIENT_HANDSHAKE_SIZE] {
        let mut data = [0u8; CLIENT_HANDSHAKE_SIZE];
        data[0..4].copy_from_slice(&REFLEX_MAGIC.to_be_bytes());
        data[4..36].copy_from_slice(&self.public_key);
        data[36..52].copy_from_slice(self.user_id.as_bytes());
        data[52..60].copy_from_slice(&self.timestamp.to_be_bytes());
        data[60..76].copy_from_slice(&self.nonce);
        data
    }

    /// Parse a client handshake from the wire.
    pub fn unmarshal(data: &[u8]) -> Result<Self> {
        if data.len() < CLIENT_HANDSHAKE_SIZE {
            return Err(Error::Short {
                expected: CLIENT_HANDSHAKE_SIZE,
                actual: data.len(),
            });
        }

        let magic = u32::from_be_bytes(data[0..4].try_into().unwrap());
        if magic != REFLEX_MAGIC {
            return Err(Error::BadMagic);
        }

        let mut public_key = [0u8; PUBLIC_KEY_SIZE];
        public_key.copy_from_slice(&data[4..36]);

        let user_id = Uuid::from_slice(&data[36..52]).expect("slice is 16 bytes");
        let timestamp = i64::from_be_bytes(data[52..60].try_into().unwrap());

        let mut nonce = [0u8; HANDSHAKE_NONCE_SIZE];
        nonce.copy_from_slice(&data[60..76]);

        Ok(Self {
            public_key,
            user_id,
            timestamp,
            nonce,
        })
    }

    /// The replay-tracker key: big-endian u64 of the first eight nonce bytes.
    pub fn nonce_key(&self) -> u64 {
        u64::from_be_bytes(self.nonce[0..8].try_into().unwrap())
    }
}

/// Server-side handshake response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHandshake {
    /// Server's ephemeral X25519 public key
    pub public_key: [u8; PUBLIC_KEY_SIZE],
    /// Reserved; sent zero-filled and ignored on receipt
    pub policy_grant: [u8; 32],
}

impl ServerHandshake {
    /// Create a response carrying the server's public key and a zero grant.
    pub fn new(public_key: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self {
            public_key,
            policy_grant: [0u8; 32],
        }
    }

    /// Serialize into the fixed wire layout.
    pub fn marshal(&self) -> [u8; SERVER_HANDSHAKE_SIZE] {
        let mut data = [0u8; SERVER_HANDSHAKE_SIZE];
        data[0..32].copy_from_slice(&self.public_key);
        data[32..64].copy_from_slice(&self.policy_grant);
        data
    }

    /// Parse a server handshake from the wire.
    pub fn unmarshal(data: &[u8]) -> Result<Self> {
        if data.len() < SERVER_HANDSHAKE_SIZE {
            return Err(Error::Short {
                expected: SERVER_HANDSHAKE_SIZE,
                actual: data.len(),
            });
        }

        let mut public_key = [0u8; PUBLIC_KEY_SIZE];
        public_key.copy_from_slice(&data[0..32]);
        let mut policy_grant = [0u8; 32];
        policy_grant.copy_from_slice(&data[32..64]);

        Ok(Self {
            public_key,
            policy_grant,
        })
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Check that a handshake timestamp is within the accepted drift window.
pub fn validate_timestamp(timestamp: i64) -> bool {
    (unix_now() - timestamp).abs() <= MAX_TIMESTAMP_DRIFT_SECS
}

/// A configured client reference used for authentication lookup.
#[derive(Debug, Clone)]
pub struct ClientEntry {
    /// UUID string as it appears in configuration
    pub id: String,
    /// Traffic profile name for this client's connections
    pub policy: String,
}

/// Look up a client by UUID.
///
/// Comparison is constant-time over the 16 UUID bytes; entries whose id does
/// not parse as a UUID are skipped. First match wins.
pub fn authenticate_user<'a>(user_id: &Uuid, clients: &'a [ClientEntry]) -> Option<&'a ClientEntry> {
    for client in clients {
        let parsed = match Uuid::parse_str(&client.id) {
            Ok(id) => id,
            Err(_) => continue,
        };
        if user_id.as_bytes().ct_eq(parsed.as_bytes()).into() {
            return Some(client);
        }
    }
    None
}
