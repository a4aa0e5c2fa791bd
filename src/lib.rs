//! # Reflex
//!
//! A proxy tunneling protocol designed to be statistically indistinguishable
//! from ordinary application traffic and resistant to active probing.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Proxy Handlers (inbound / outbound)        │
//! ├─────────────────────────────────────────────────────────┤
//! │  Traffic Morph (profile-shaped sizes and delays)        │
//! ├─────────────────────────────────────────────────────────┤
//! │  Frame Channel (ChaCha20-Poly1305, per-direction nonces)│
//! ├─────────────────────────────────────────────────────────┤
//! │  Handshake (X25519 + HKDF, replay & timestamp defense)  │
//! ├─────────────────────────────────────────────────────────┤
//! │  Fallback Relay (non-Reflex bytes to co-located origin) │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Goals
//!
//! 1. **Indistinguishability**: packet sizes and timing morphed to match a
//!    chosen reference application (video streaming, VoIP, REST, ...)
//! 2. **Probe Resistance**: unauthenticated traffic is relayed verbatim to a
//!    real origin on the same port, peeked bytes included
//! 3. **Forward Secrecy**: ephemeral X25519 keys per connection
//! 4. **Replay Defense**: timestamp window plus a bounded nonce tracker

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod account;
pub mod config;
pub mod crypto;
pub mod ech;
pub mod error;
pub mod morph;
pub mod protocol;
pub mod proxy;

pub use error::{Error, Result};
