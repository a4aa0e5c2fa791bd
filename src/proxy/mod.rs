//! Connection handlers.
//!
//! [`inbound`] accepts TCP connections, classifies them as Reflex or
//! fallback traffic, and bridges authenticated sessions to their tunnel
//! destinations. [`outbound`] is the client side: it dials a Reflex server
//! and tunnels a local stream to a destination. [`fallback`] relays
//! unclassified traffic verbatim to a co-located origin.

pub mod fallback;
pub mod inbound;
pub mod outbound;

pub use inbound::InboundHandler;
pub use outbound::OutboundHandler;

use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::morph::TrafficMorph;
use crate::protocol::{Address, Destination, FrameType, Session, MAX_FRAME_PAYLOAD};

/// Connection phase deadlines.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Deadline for completing the handshake after accept
    pub handshake: Duration,
    /// Idle cutoff for an established session; reset on every transfer
    pub idle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(10),
            idle: Duration::from_secs(300),
        }
    }
}

/// Tracks the time of the last transfer on a connection.
///
/// Both pumps call [`touch`](Self::touch) on every successful transfer;
/// [`expired`](Self::expired) resolves once no transfer has happened for
/// the configured window.
pub(crate) struct ActivityTimer {
    last: Mutex<Instant>,
    timeout: Duration,
}

impl ActivityTimer {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            last: Mutex::new(Instant::now()),
            timeout,
        }
    }

    /// Record activity, pushing the idle deadline out.
    pub(crate) fn touch(&self) {
        *self.last.lock() = Instant::now();
    }

    /// Resolve when the idle window elapses with no intervening activity.
    pub(crate) async fn expired(&self) {
        loop {
            let deadline = *self.last.lock() + self.timeout;
            if Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep_until(deadline).await;
        }
    }
}

/// Dial attempts before an outbound connection gives up.
pub(crate) const DIAL_ATTEMPTS: u32 = 5;

/// Base delay for the exponential dial backoff.
pub(crate) const DIAL_BASE_DELAY: Duration = Duration::from_millis(200);

/// Dial `addr`, retrying with exponential backoff.
pub(crate) async fn dial_with_backoff(addr: &str) -> Result<TcpStream> {
    let mut delay = DIAL_BASE_DELAY;
    let mut last_err = String::new();

    for attempt in 0..DIAL_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last_err = e.to_string(),
        }
    }
    Err(Error::DialFailed(last_err))
}

/// Open the upstream connection for a decoded tunnel destination.
pub(crate) async fn connect_destination(dest: &Destination) -> Result<TcpStream> {
    let connected = match &dest.address {
        Address::Ipv4(ip) => TcpStream::connect((*ip, dest.port)).await,
        Address::Ipv6(ip) => TcpStream::connect((*ip, dest.port)).await,
        Address::Domain(name) => TcpStream::connect((name.as_str(), dest.port)).await,
    };
    let stream = connected.map_err(|e| Error::DispatchFailed(e.to_string()))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Pump decrypted frames into a raw byte stream.
///
/// DATA payloads are forwarded; PADDING/TIMING frames steer the local morph
/// state; CLOSE ends the pump normally.
pub(crate) async fn pump_frames_out<R, W>(
    session: &Session,
    frames_in: &mut R,
    raw_out: &mut W,
    morph: Option<&TrafficMorph>,
    timer: &ActivityTimer,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = session.read_frame(frames_in).await?;
        match frame.frame_type {
            FrameType::Data => {
                raw_out.write_all(&frame.payload).await?;
                timer.touch();
            }
            FrameType::Padding | FrameType::Timing => {
                if let Some(morph) = morph {
                    morph.handle_control_frame(&frame);
                }
            }
            FrameType::Close => return Ok(()),
        }
    }
}

/// Pump a raw byte stream into encrypted frames.
///
/// Morphs output when a profile is active; sends CLOSE when the raw side
/// reaches EOF.
pub(crate) async fn pump_raw_in<R, W>(
    session: &Session,
    raw_in: &mut R,
    frames_out: &mut W,
    morph: Option<&TrafficMorph>,
    timer: &ActivityTimer,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; MAX_FRAME_PAYLOAD];
    loop {
        let n = raw_in.read(&mut buf).await?;
        if n == 0 {
            session.write_close(frames_out).await?;
            return Ok(());
        }
        match morph {
            Some(morph) => morph.morph_write(session, frames_out, &buf[..n]).await?,
            None => {
                session
                    .write_frame(frames_out, FrameType::Data, &buf[..n])
                    .await?
            }
        }
        timer.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_activity_timer_expires_when_idle() {
        let timer = ActivityTimer::new(Duration::from_secs(5));
        tokio::time::timeout(Duration::from_secs(6), timer.expired())
            .await
            .expect("timer should have expired");
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_timer_touch_defers_expiry() {
        let timer = std::sync::Arc::new(ActivityTimer::new(Duration::from_secs(5)));

        let toucher = std::sync::Arc::clone(&timer);
        tokio::spawn(async move {
            for _ in 0..4 {
                tokio::time::sleep(Duration::from_secs(3)).await;
                toucher.touch();
            }
        });

        // Four touches at 3s intervals keep the 5s window alive past 12s
        let waited = tokio::time::timeout(Duration::from_secs(12), timer.expired()).await;
        assert!(waited.is_err(), "timer expired despite activity");

        // Once touches stop, expiry follows
        tokio::time::timeout(Duration::from_secs(10), timer.expired())
            .await
            .expect("timer should expire after activity stops");
    }

    #[tokio::test]
    async fn test_dial_backoff_surfaces_failure() {
        tokio::time::pause();
        // Port 1 on localhost refuses immediately
        let result = dial_with_backoff("127.0.0.1:1").await;
        assert!(matches!(result, Err(Error::DialFailed(_))));
    }
}
