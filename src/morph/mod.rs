//! Traffic morphing engine.
//!
//! Morphing reshapes the tunnel's packet-size and inter-frame-delay
//! distributions to match a target application profile. Outgoing buffers
//! are split into profile-sized DATA frames, the final chunk is padded with
//! random bytes to the sampled size, and a sampled delay is slept between
//! frames. Either peer can steer the other's next size or delay with
//! in-band PADDING/TIMING control frames.

mod profiles;

use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::io::AsyncWrite;

pub use profiles::{lookup, TrafficProfile, PROFILE_NAMES};

use crate::crypto::{random_padding, TAG_SIZE};
use crate::error::Result;
use crate::protocol::{Frame, FrameType, Session, FRAME_HEADER_SIZE, MAX_FRAME_PAYLOAD};

/// Fallback packet size when a profile has no size distribution.
const DEFAULT_PACKET_SIZE: usize = 1400;

/// Fallback delay when a profile has no delay distribution.
const DEFAULT_DELAY: Duration = Duration::from_millis(10);

/// Single-shot override cells set by peer control frames.
#[derive(Default)]
struct Overrides {
    next_size: Option<usize>,
    next_delay: Option<Duration>,
}

/// Per-connection morphing state.
///
/// The profile tables are shared, read-only statics; the override cells are
/// owned by this connection and consumed at most once each.
pub struct TrafficMorph {
    profile: &'static TrafficProfile,
    enabled: bool,
    overrides: Mutex<Overrides>,
}

impl TrafficMorph {
    /// Create a morph engine for the named profile.
    ///
    /// Returns `None` for an empty or unknown name, which disables morphing
    /// for the connection.
    pub fn new(profile_name: &str) -> Option<Self> {
        let profile = lookup(profile_name)?;
        Some(Self {
            profile,
            enabled: true,
            overrides: Mutex::new(Overrides::default()),
        })
    }

    /// The profile this engine is shaping towards.
    pub fn profile(&self) -> &'static TrafficProfile {
        self.profile
    }

    /// Next target wire size: a pending override, or a fresh sample.
    pub fn next_packet_size(&self) -> usize {
        if let Some(size) = self.overrides.lock().next_size.take() {
            return size;
        }
        sample_size(self.profile.packet_sizes)
    }

    /// Next inter-frame delay: a pending override, or a fresh sample.
    pub fn next_delay(&self) -> Duration {
        if let Some(delay) = self.overrides.lock().next_delay.take() {
            return delay;
        }
        sample_delay(self.profile.delays)
    }

    /// Override the next packet size (set by a peer PADDING control frame).
    pub fn set_next_packet_size(&self, size: usize) {
        self.overrides.lock().next_size = Some(size);
    }

    /// Override the next delay (set by a peer TIMING control frame).
    pub fn set_next_delay(&self, delay: Duration) {
        self.overrides.lock().next_delay = Some(delay);
    }

    /// Apply a peer control frame to this connection's morph state.
    ///
    /// PADDING payloads shorter than 2 bytes and TIMING payloads shorter
    /// than 8 bytes are ignored.
    pub fn handle_control_frame(&self, frame: &Frame) {
        match frame.frame_type {
            FrameType::Padding => {
                if frame.payload.len() >= 2 {
                    let target = u16::from_be_bytes([frame.payload[0], frame.payload[1]]);
                    self.set_next_packet_size(target as usize);
                }
            }
            FrameType::Timing => {
                if frame.payload.len() >= 8 {
                    let ms = u64::from_be_bytes(frame.payload[0..8].try_into().unwrap());
                    self.set_next_delay(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
    }

    /// Write `data` as profile-shaped DATA frames.
    ///
    /// Target sizes refer to ciphertext plus header on the wire, so the
    /// AEAD tag and frame header are subtracted before slicing plaintext.
    /// The final chunk is padded with random bytes up to the chunk size.
    pub async fn morph_write<W>(&self, session: &Session, writer: &mut W, data: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        if !self.enabled {
            return session.write_frame(writer, FrameType::Data, data).await;
        }

        let mut remaining = data;
        while !remaining.is_empty() {
            let target = self.next_packet_size();

            let mut chunk_size = target.saturating_sub(TAG_SIZE + FRAME_HEADER_SIZE);
            if chunk_size == 0 {
                // Degenerate profile: overhead exceeds the target size
                chunk_size = target;
            }
            chunk_size = chunk_size.clamp(1, MAX_FRAME_PAYLOAD);

            if remaining.len() <= chunk_size {
                let mut chunk = remaining.to_vec();
                chunk.extend_from_slice(&random_padding(chunk_size - remaining.len()));
                session.write_frame(writer, FrameType::Data, &chunk).await?;
                remaining = &[];
            } else {
                session
                    .write_frame(writer, FrameType::Data, &remaining[..chunk_size])
                    .await?;
                remaining = &remaining[chunk_size..];
            }

            let delay = self.next_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(())
    }
}

/// Pick a wire size from a weighted distribution.
///
/// ±5% multiplicative jitter avoids perfectly discrete values.
fn sample_size(dists: &[(usize, f64)]) -> usize {
    if dists.is_empty() {
        return DEFAULT_PACKET_SIZE;
    }

    let mut rng = rand::thread_rng();
    let r: f64 = rng.gen();

    let mut cumsum = 0.0;
    for &(size, weight) in dists {
        cumsum += weight;
        if r <= cumsum {
            let jitter = 1.0 + (rng.gen::<f64>() - 0.5) * 0.1;
            return (size as f64 * jitter).round() as usize;
        }
    }
    dists[dists.len() - 1].0
}

/// Pick an inter-frame delay from a weighted distribution.
///
/// ±20% multiplicative jitter avoids perfectly discrete timing.
fn sample_delay(dists: &[(Duration, f64)]) -> Duration {
    if dists.is_empty() {
        return DEFAULT_DELAY;
    }

    let mut rng = rand::thread_rng();
    let r: f64 = rng.gen();

    let mut cumsum = 0.0;
    for &(delay, weight) in dists {
        cumsum += weight;
        if r <= cumsum {
            let jitter = 1.0 + (rng.gen::<f64>() - 0.5) * 0.4;
            return delay.mul_f64(jitter);
        }
    }
    dists[dists.len() - 1].0
}
