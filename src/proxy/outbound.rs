//! Outbound connection handling.
//!
//! The client side of the tunnel: dial the Reflex server with backoff, run
//! the handshake, emit the destination (plus any immediately-available
//! payload) in the first DATA frame, then pump both directions.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::OutboundConfig;
use crate::crypto::{derive_session_key, derive_shared, generate_keypair, SecureRandom};
use crate::error::{Error, Result};
use crate::morph::TrafficMorph;
use crate::protocol::{
    unix_now, ClientHandshake, Destination, FrameType, ServerHandshake, Session,
    MAX_FRAME_PAYLOAD, SERVER_HANDSHAKE_SIZE,
};
use crate::proxy::{dial_with_backoff, pump_frames_out, pump_raw_in, ActivityTimer, Timeouts};

/// Bounded wait for the first local payload bytes, so the opening frame
/// carries destination plus data when the application speaks first, and
/// destination alone when it does not.
const FIRST_PAYLOAD_WAIT: Duration = Duration::from_millis(500);

/// Outbound connection handler for the Reflex protocol.
pub struct OutboundHandler {
    server_addr: String,
    client_id: Uuid,
    policy: String,
    timeouts: Timeouts,
}

impl OutboundHandler {
    /// Build a handler from validated configuration.
    pub fn new(config: &OutboundConfig) -> Result<Self> {
        config.validate()?;
        let client_id = Uuid::parse_str(&config.id)
            .map_err(|_| Error::config(format!("invalid client id: {:?}", config.id)))?;

        Ok(Self {
            server_addr: format!("{}:{}", config.address, config.port),
            client_id,
            policy: config.policy.clone(),
            timeouts: Timeouts::default(),
        })
    }

    /// Override the default phase deadlines.
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Tunnel one local stream to `destination` through the Reflex server.
    pub async fn process<S>(&self, local: S, destination: Destination) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut server = dial_with_backoff(&self.server_addr).await?;

        tracing::info!(
            %destination,
            server = %self.server_addr,
            "tunneling request via reflex server"
        );

        // Handshake: fresh keypair and nonce, then the server's reply
        let (client_priv, client_pub) = generate_keypair();
        let nonce: [u8; 16] = SecureRandom::bytes();
        let handshake = ClientHandshake {
            public_key: client_pub,
            user_id: self.client_id,
            timestamp: unix_now(),
            nonce,
        };
        server.write_all(&handshake.marshal()).await?;

        let mut reply = [0u8; SERVER_HANDSHAKE_SIZE];
        timeout(self.timeouts.handshake, server.read_exact(&mut reply))
            .await
            .map_err(|_| Error::Timeout)??;
        let server_hs = ServerHandshake::unmarshal(&reply)?;

        // The session key is derived from the client's own nonce,
        // symmetrically with the server side.
        let shared = derive_shared(&client_priv, &server_hs.public_key)?;
        let session_key = derive_session_key(&shared, &nonce)?;
        let session = Session::new(&session_key)?;
        let morph = TrafficMorph::new(&self.policy);

        let (mut local_read, mut local_write) = tokio::io::split(local);
        let (mut server_read, mut server_write) = server.into_split();

        // First frame: destination, then whatever the application has
        // already written, if it arrives within the bounded wait.
        let mut first = destination.encode();
        let mut buf = vec![0u8; MAX_FRAME_PAYLOAD - first.len()];
        match timeout(FIRST_PAYLOAD_WAIT, local_read.read(&mut buf)).await {
            Ok(Ok(n)) if n > 0 => first.extend_from_slice(&buf[..n]),
            Ok(Ok(_)) => {} // local EOF; the request pump will send CLOSE
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {} // quiet application; send the destination alone
        }
        session
            .write_frame(&mut server_write, FrameType::Data, &first)
            .await?;

        let timer = ActivityTimer::new(self.timeouts.idle);
        let request = pump_raw_in(
            &session,
            &mut local_read,
            &mut server_write,
            morph.as_ref(),
            &timer,
        );
        let response = pump_frames_out(
            &session,
            &mut server_read,
            &mut local_write,
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InboundConfig, UserConfig};
    use crate::proxy::InboundHandler;
    use tokio::io::duplex;
    use tokio::net::TcpListener;

    const CLIENT_ID: &str = "b831381d-6324-4d53-ad4f-8cda48b30811";

    fn outbound(port: u16, policy: &str) -> OutboundHandler {
        OutboundHandler::new(&OutboundConfig {
            address: "127.0.0.1".into(),
            port: port as u32,
            id: CLIENT_ID.into(),
            policy: policy.into(),
            ech: None,
        })
        .unwrap()
    }

    /// Start a full inbound listener and return its port.
    async fn spawn_reflex_server(policy: &str) -> u16 {
        let handler = InboundHandler::new(&InboundConfig {
            clients: vec![UserConfig {
                id: CLIENT_ID.into(),
                policy: policy.into(),
            }],
            fallback: None,
            ech: None,
        })
        .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let handler = std::sync::Arc::new(handler);
            loop {
                let Ok((stream, peer)) = listener.accept().await else {
                    break;
                };
                let handler = std::sync::Arc::clone(&handler);
                tokio::spawn(async move {
                    let _ = handler.handle(stream, peer).await;
                });
            }
        });
        port
    }

    /// Echo upstream that reverses each request line.
    async fn spawn_upstream() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            conn.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"hello");
            conn.write_all(b"olleh").await.unwrap();
        });
        port
    }

    #[tokio::test]
    async fn test_end_to_end_tunnel() {
        let upstream_port = spawn_upstream().await;
        let server_port = spawn_reflex_server("").await;

        let handler = outbound(server_port, "");
        let (mut app, local_side) = duplex(16 * 1024);

        let tunnel = tokio::spawn(async move {
            handler
                .process(local_side, Destination::from_host("127.0.0.1", upstream_port))
                .await
        });

        // The application speaks first; its bytes ride the opening frame
        app.write_all(b"hello").await.unwrap();

        let mut response = [0u8; 5];
        app.read_exact(&mut response).await.unwrap();
        assert_eq!(&response, b"olleh");

        // Local EOF propagates a CLOSE and both sides wind down
        drop(app);
        tunnel.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_quiet_application_still_connects() {
        // Upstream that speaks first, like an SMTP banner
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            conn.write_all(b"220 ready\r\n").await.unwrap();
        });

        let server_port = spawn_reflex_server("").await;
        let handler = outbound(server_port, "");
        let (mut app, local_side) = duplex(4096);

        let tunnel = tokio::spawn(async move {
            handler
                .process(local_side, Destination::from_host("127.0.0.1", upstream_port))
                .await
        });

        // The application writes nothing; after the bounded wait the
        // destination-only frame still opens the tunnel.
        let mut banner = [0u8; 11];
        app.read_exact(&mut banner).await.unwrap();
        assert_eq!(&banner, b"220 ready\r\n");

        drop(app);
        tunnel.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_morphed_end_to_end() {
        // 4 KiB upstream response through a morphing tunnel
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_port = listener.local_addr().unwrap().port();
        let body: Vec<u8> = (0..4096u32).map(|i| (i % 239) as u8).collect();
        let expected = body.clone();
        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut sig = [0u8; 2];
            conn.read_exact(&mut sig).await.unwrap();
            conn.write_all(&body).await.unwrap();
        });

        let server_port = spawn_reflex_server("zoom").await;
        let handler = outbound(server_port, "zoom");
        let (mut app, local_side) = duplex(64 * 1024);

        let tunnel = tokio::spawn(async move {
            handler
                .process(local_side, Destination::from_host("127.0.0.1", upstream_port))
                .await
        });

        app.write_all(b"go").await.unwrap();

        // Morph padding may trail the body; read exactly the body length
        let mut response = vec![0u8; expected.len()];
        app.read_exact(&mut response).await.unwrap();
        assert_eq!(response, expected);

        // Half-close so trailing padding frames can still drain
        app.shutdown().await.unwrap();
        tunnel.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_dial_failure_after_retries() {
        tokio::time::pause();
        let handler = outbound(1, ""); // nothing listens on port 1

        let (_app, local_side) = duplex(1024);
        let result = handler
            .process(local_side, Destination::from_host("127.0.0.1", 80))
            .await;
        assert!(matches!(result, Err(Error::DialFailed(_))));
    }
}
