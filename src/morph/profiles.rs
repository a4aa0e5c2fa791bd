//! Built-in traffic profiles.
//!
//! Each profile is a statistical model of a target application's traffic,
//! derived from published network traffic characterization studies:
//!
//! - **youtube**: MPEG-DASH streaming analysis (IMC 2017, IEEE Access 2022).
//!   Video chunks are sent in bursts near MTU size, interspersed with smaller
//!   audio/control packets.
//! - **zoom**: passive measurement studies (IMC 2022, ICPE 2023, PAM 2022).
//!   Audio frames at ~20ms intervals, video at ~33ms, sizes clustered around
//!   200-700 bytes with a secondary mode at MTU for screen sharing.
//! - **netflix**: DASH adaptive streaming with larger initial burst segments
//!   followed by steady-state playback.
//! - **http2-api**: REST-over-HTTP/2 workloads with small request frames and
//!   variable response payloads, timing driven by user interaction.
//! - **discord**: VoIP with small fixed-interval Opus frames at ~20ms
//!   cadence, occasional larger packets for video.

use std::time::Duration;

/// A statistical model of a target application's traffic.
///
/// Weights within each distribution sum to approximately 1.0.
pub struct TrafficProfile {
    /// Human-readable profile name
    pub name: &'static str,
    /// Wire packet sizes (bytes) with probability weights
    pub packet_sizes: &'static [(usize, f64)],
    /// Inter-packet delays with probability weights
    pub delays: &'static [(Duration, f64)],
}

const fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

static YOUTUBE: TrafficProfile = TrafficProfile {
    name: "YouTube DASH Streaming",
    packet_sizes: &[
        (1460, 0.32), // MTU-sized video chunk segments
        (1400, 0.18), // Near-MTU video data
        (1200, 0.14), // Partial video segments
        (1000, 0.10), // Mid-range video/audio mux
        (800, 0.08),  // Audio + metadata
        (500, 0.06),  // Control / manifest fetch
        (300, 0.05),  // Small HTTP/2 frames
        (150, 0.04),  // ACK / window update
        (64, 0.03),   // TCP ACK
    ],
    delays: &[
        (ms(1), 0.15),   // Intra-burst (back-to-back)
        (ms(3), 0.20),   // Intra-burst spacing
        (ms(8), 0.20),   // Short gap
        (ms(15), 0.15),  // Video frame interval
        (ms(33), 0.12),  // ~30fps boundary
        (ms(80), 0.08),  // Buffer refill gap
        (ms(150), 0.06), // Segment boundary
        (ms(500), 0.04), // Adaptive bitrate pause
    ],
};

static ZOOM: TrafficProfile = TrafficProfile {
    name: "Zoom Video Conference",
    packet_sizes: &[
        (160, 0.22),  // Opus audio frames (20ms)
        (250, 0.12),  // Audio + FEC
        (400, 0.10),  // Small video keyframe slice
        (550, 0.16),  // Typical video P-frame
        (700, 0.14),  // Large video frame
        (900, 0.10),  // Video I-frame slice
        (1200, 0.09), // Screen share data
        (1460, 0.07), // Full MTU screen share
    ],
    delays: &[
        (ms(5), 0.10),   // Back-to-back fragments
        (ms(10), 0.15),  // Intra-frame
        (ms(20), 0.30),  // Audio cadence (20ms)
        (ms(33), 0.25),  // Video cadence (~30fps)
        (ms(50), 0.12),  // Probe / RTCP
        (ms(100), 0.08), // Bandwidth adaptation
    ],
};

static NETFLIX: TrafficProfile = TrafficProfile {
    name: "Netflix DASH Streaming",
    packet_sizes: &[
        (1460, 0.38), // Dominant: MTU-sized video
        (1380, 0.15), // Near-MTU
        (1100, 0.12), // Partial segment
        (800, 0.10),  // Audio segments
        (500, 0.08),  // HTTP/2 headers + small body
        (250, 0.07),  // Control frames
        (100, 0.06),  // Window updates / ACKs
        (50, 0.04),   // Keep-alive / PING
    ],
    delays: &[
        (ms(1), 0.25),    // Burst download
        (ms(5), 0.20),    // Intra-segment
        (ms(12), 0.15),   // Segment gap
        (ms(40), 0.15),   // Frame boundary
        (ms(100), 0.10),  // Buffer level pause
        (ms(250), 0.08),  // Segment fetch interval
        (ms(1000), 0.07), // Buffer full, wait
    ],
};

static HTTP2_API: TrafficProfile = TrafficProfile {
    name: "HTTP/2 REST API",
    packet_sizes: &[
        (128, 0.15),  // Small JSON responses
        (256, 0.18),  // Typical API request
        (512, 0.22),  // Medium response body
        (1024, 0.18), // Large API response
        (1460, 0.10), // Paginated / list responses
        (64, 0.10),   // HEADERS-only / empty body
        (32, 0.07),   // PING / WINDOW_UPDATE
    ],
    delays: &[
        (ms(2), 0.10),    // Pipelined
        (ms(10), 0.15),   // Fast response
        (ms(50), 0.25),   // Typical API latency
        (ms(100), 0.20),  // Moderate
        (ms(200), 0.15),  // Slow query
        (ms(500), 0.10),  // Heavy computation
        (ms(1000), 0.05), // Timeout-adjacent
    ],
};

static DISCORD: TrafficProfile = TrafficProfile {
    name: "Discord Voice/Video",
    packet_sizes: &[
        (120, 0.28),  // Opus voice (low bitrate)
        (200, 0.22),  // Opus voice (normal bitrate)
        (320, 0.15),  // Opus voice + FEC
        (500, 0.12),  // Video thumbnail / small
        (800, 0.10),  // Video frame slice
        (1200, 0.08), // Video keyframe slice
        (1460, 0.05), // Screen share MTU
    ],
    delays: &[
        (ms(5), 0.08),   // Back-to-back
        (ms(20), 0.40),  // Opus 20ms cadence
        (ms(33), 0.22),  // Video 30fps
        (ms(40), 0.15),  // Mixed
        (ms(60), 0.10),  // Low activity
        (ms(100), 0.05), // Idle keepalive
    ],
};

/// Look up a built-in profile by its configuration name.
pub fn lookup(name: &str) -> Option<&'static TrafficProfile> {
    match name {
        "youtube" => Some(&YOUTUBE),
        "zoom" => Some(&ZOOM),
        "netflix" => Some(&NETFLIX),
        "http2-api" => Some(&HTTP2_API),
        "discord" => Some(&DISCORD),
        _ => None,
    }
}

/// Names of all built-in profiles.
pub const PROFILE_NAMES: &[&str] = &["youtube", "zoom", "netflix", "http2-api", "discord"];
