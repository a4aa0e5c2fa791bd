//! Reflex wire protocol.
//!
//! The protocol has two phases per connection:
//!
//! 1. **Handshake** — a fixed-layout exchange carrying the client's
//!    ephemeral X25519 key, identity, timestamp, and replay nonce, answered
//!    by the server's ephemeral key.
//! 2. **Frame channel** — length-prefixed ChaCha20-Poly1305 frames with
//!    independent nonce counters per direction.
//!
//! The first DATA frame from the client embeds the tunnel destination
//! ([`Destination`]); PADDING and TIMING frames steer the peer's traffic
//! morphing in-band.

mod destination;
mod frame;
mod handshake;
mod replay;

pub use destination::{Address, Destination};
pub use frame::{
    encode_padding_ctrl, encode_timing_ctrl, Frame, FrameType, Session, FRAME_HEADER_SIZE,
    MAX_FRAME_PAYLOAD,
};
pub use handshake::{
    authenticate_user, unix_now, validate_timestamp, ClientEntry, ClientHandshake,
    ServerHandshake, CLIENT_HANDSHAKE_SIZE, MAX_TIMESTAMP_DRIFT_SECS, REFLEX_MAGIC,
    SERVER_HANDSHAKE_SIZE,
};
pub use replay::NonceTracker;
