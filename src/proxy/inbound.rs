//! Inbound connection handling.
//!
//! Per accepted connection: classify the first bytes, run the handshake
//! under a deadline, then bridge the encrypted frame channel to the tunnel
//! destination. Anything that is not Reflex — wrong magic, truncated
//! handshake, unknown client — is relayed to the fallback origin when one
//! is configured, with every consumed byte replayed.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::config::InboundConfig;
use crate::crypto::{derive_session_key, derive_shared, generate_keypair};
use crate::error::{Error, Result};
use crate::morph::TrafficMorph;
use crate::protocol::{
    authenticate_user, validate_timestamp, ClientEntry, ClientHandshake, Destination, FrameType,
    NonceTracker, ServerHandshake, Session, CLIENT_HANDSHAKE_SIZE, REFLEX_MAGIC,
};
use crate::proxy::fallback::relay_to_fallback;
use crate::proxy::{connect_destination, pump_frames_out, pump_raw_in, ActivityTimer, Timeouts};

/// Shared replay-tracker capacity.
///
/// Sized so the 120s timestamp window dominates: at peak rate R
/// handshakes/s the tracker should hold at least 120*R entries.
pub const REPLAY_TRACKER_CAPACITY: usize = 10_000;

/// Inbound connection handler for the Reflex protocol.
///
/// One handler serves a listener; per-connection state lives in
/// [`handle`](Self::handle).
pub struct InboundHandler {
    clients: Vec<ClientEntry>,
    fallback_port: Option<u32>,
    nonce_tracker: NonceTracker,
    timeouts: Timeouts,
}

impl InboundHandler {
    /// Build a handler from validated configuration.
    pub fn new(config: &InboundConfig) -> Result<Self> {
        let clients = config.build_clients()?;
        config.validate_ech()?;

        Ok(Self {
            clients,
            fallback_port: config.fallback_port(),
            nonce_tracker: NonceTracker::new(REPLAY_TRACKER_CAPACITY),
            timeouts: Timeouts::default(),
        })
    }

    /// Override the default phase deadlines.
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Process one accepted connection to completion.
    pub async fn handle<S>(&self, mut stream: S, peer: SocketAddr) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        // Handshake phase runs under its own deadline; the deadline does not
        // apply once the frame pump starts.
        let mut consumed = Vec::with_capacity(CLIENT_HANDSHAKE_SIZE);
        let handshake = match timeout(
            self.timeouts.handshake,
            read_client_handshake(&mut stream, &mut consumed),
        )
        .await
        {
            Ok(Ok(handshake)) => handshake,
            Ok(Err(e)) => return self.divert(stream, consumed, e, peer).await,
            Err(_) => return self.divert(stream, consumed, Error::Timeout, peer).await,
        };

        // Replay defenses are always fatal: a prober replaying a captured
        // handshake must not be forwarded anywhere.
        if !validate_timestamp(handshake.timestamp) {
            tracing::warn!(%peer, stage = "handshake", error = %Error::StaleTimestamp, "closing connection");
            return Err(Error::StaleTimestamp);
        }
        if !self.nonce_tracker.check(handshake.nonce_key()) {
            tracing::warn!(%peer, stage = "handshake", error = %Error::Replay, "closing connection");
            return Err(Error::Replay);
        }

        let entry = match authenticate_user(&handshake.user_id, &self.clients) {
            Some(entry) => entry.clone(),
            None => return self.divert(stream, consumed, Error::AuthUnknown, peer).await,
        };

        // Reply with the server's ephemeral key and derive the session key
        let (server_priv, server_pub) = generate_keypair();
        let result: Result<[u8; 32]> = (|| {
            let shared = derive_shared(&server_priv, &handshake.public_key)?;
            derive_session_key(&shared, &handshake.nonce)
        })();
        let session_key = match result {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(%peer, stage = "key-agreement", error = %e, "closing connection");
                return Err(e);
            }
        };

        if let Err(e) = stream
            .write_all(&ServerHandshake::new(server_pub).marshal())
            .await
        {
            tracing::warn!(%peer, stage = "reply", error = %e, "closing connection");
            return Err(e.into());
        }

        if let Err(e) = self.run_session(stream, &entry, &session_key, peer).await {
            tracing::warn!(%peer, stage = "session", error = %e, "reflex session ended");
            return Err(e);
        }
        Ok(())
    }

    /// Bridge an authenticated frame channel to its tunnel destination.
    async fn run_session<S>(
        &self,
        stream: S,
        entry: &ClientEntry,
        session_key: &[u8],
        peer: SocketAddr,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let session = Session::new(session_key)?;
        let morph = TrafficMorph::new(&entry.policy);

        let (mut client_read, mut client_write) = tokio::io::split(stream);

        // The first frame must be DATA carrying the destination
        let first = session.read_frame(&mut client_read).await?;
        if first.frame_type != FrameType::Data || first.payload.is_empty() {
            return Err(Error::destination("first frame must carry a destination"));
        }
        let (destination, leftover) = Destination::decode(&first.payload)?;

        tracing::info!(%peer, %destination, client = %entry.id, "reflex session accepted");

        let upstream = connect_destination(&destination).await?;
        let (mut upstream_read, mut upstream_write) = upstream.into_split();

        if !leftover.is_empty() {
            upstream_write.write_all(leftover).await?;
        }

        let timer = ActivityTimer::new(self.timeouts.idle);
        let request = pump_frames_out(
            &session,
            &mut client_read,
            &mut upstream_write,
            morph.as_ref(),
            &timer,
        );
        let response = pump_raw_in(
            &session,
            &mut upstream_read,
            &mut client_write,
            morph.as_ref(),
            &timer,
        );

        tokio::select! {
            res = async { tokio::try_join!(request, response) } => {
                res?;
                Ok(())
            }
            _ = timer.expired() => Err(Error::Timeout),
        }
    }

    /// Route a failed classification to the fallback origin, or close.
    async fn divert<S>(
        &self,
        stream: S,
        consumed: Vec<u8>,
        error: Error,
        peer: SocketAddr,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if error.fallback_eligible() {
            if let Some(port) = self.fallback_port {
                tracing::info!(%peer, reason = %error, "relaying connection to fallback origin");
                return relay_to_fallback(stream, consumed, port, self.timeouts.idle).await;
            }
        }
        tracing::warn!(%peer, stage = "classify", error = %error, "closing connection");
        Err(error)
    }
}

/// Read and parse the 76-byte client handshake.
///
/// Every byte read is appended to `consumed` so a fallback relay can replay
/// the stream intact. Reads are issued one at a time to stay cancel-safe
/// under the handshake deadline.
async fn read_client_handshake<S>(stream: &mut S, consumed: &mut Vec<u8>) -> Result<ClientHandshake>
where
    S: AsyncRead + Unpin,
{
    read_to_buffer(stream, consumed, 4).await?;
    let magic = u32::from_be_bytes(consumed[0..4].try_into().unwrap());
    if magic != REFLEX_MAGIC {
        return Err(Error::BadMagic);
    }

    read_to_buffer(stream, consumed, CLIENT_HANDSHAKE_SIZE).await?;
    ClientHandshake::unmarshal(consumed)
}

async fn read_to_buffer<S>(stream: &mut S, buf: &mut Vec<u8>, target: usize) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    let mut chunk = [0u8; CLIENT_HANDSHAKE_SIZE];
    while buf.len() < target {
        let want = target - buf.len();
        let n = stream.read(&mut chunk[..want]).await?;
        if n == 0 {
            return Err(Error::Short {
                expected: target,
                actual: buf.len(),
            });
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(())
}
